//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the orchestration core and
//! the collaborators it drives: the diff tool, the decision store, the
//! task executor, and the event bus.

use crate::events::Event;
use crate::run::RevisionPair;
use crate::task::{TaskContext, TaskResult};
use crate::{Error, Result};
use async_trait::async_trait;

/// Lists the paths changed between two revisions.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    /// Changed paths between `base` and `head`.
    ///
    /// Returns `Error::RevisionResolution` when either revision cannot be
    /// resolved, including a base with no comparable parent.
    async fn changed_paths(&self, revisions: &RevisionPair) -> Result<Vec<String>>;
}

/// Run-scoped, write-once key/value store.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Write a value. A second write to the same key is `Error::DuplicateWrite`.
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Read a value. Missing keys are `Error::DecisionNotFound`.
    async fn get(&self, key: &str) -> Result<serde_json::Value>;

    /// Write a boolean decision.
    async fn put_flag(&self, key: &str, value: bool) -> Result<()> {
        self.put(key, serde_json::Value::Bool(value)).await
    }

    /// Read a boolean decision.
    async fn get_flag(&self, key: &str) -> Result<bool> {
        self.get(key).await?.as_bool().ok_or_else(|| {
            Error::Serialization(format!("value for '{}' is not a boolean", key))
        })
    }
}

/// Runs the opaque task body of a job instance.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskResult>;
}

/// Event bus for publishing run lifecycle events.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: Event) -> Result<()>;
}
