//! Error types for Tollgate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Change detection errors
    #[error("Cannot resolve revision {revision}: {reason}")]
    RevisionResolution { revision: String, reason: String },

    #[error("Diff failed: {0}")]
    Diff(String),

    // Decision store errors
    #[error("Decision already written for key: {0}")]
    DuplicateWrite(String),

    #[error("Decision not found for key: {0}")]
    DecisionNotFound(String),

    #[error("Invalid decision key: {0}")]
    InvalidDecisionKey(String),

    // Workflow errors
    #[error("Invalid workflow definition: {0}")]
    InvalidWorkflow(String),

    #[error("Invalid matrix: {0}")]
    InvalidMatrix(String),

    #[error("Duplicate job instance: {0}")]
    DuplicateInstance(String),

    #[error("Job graph error: {0}")]
    Graph(String),

    // Task errors
    #[error("Failed to spawn task: {0}")]
    TaskSpawn(String),

    #[error("Task timeout after {seconds} seconds")]
    TaskTimeout { seconds: u64 },

    // Infrastructure errors
    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the change detector may recover from this error locally
    /// by assuming that relevant changes exist.
    pub fn is_revision_resolution(&self) -> bool {
        matches!(self, Error::RevisionResolution { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
