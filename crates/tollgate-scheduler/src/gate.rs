//! Job gate: turn the change decision into proceed or skip.

use serde::{Deserialize, Serialize};
use tollgate_core::Result;
use tollgate_core::ports::DecisionStore;

/// Verdict returned to a gated job before its task body runs.
///
/// `Skip` is a terminal, non-failing outcome, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    Proceed,
    Skip,
}

impl GateVerdict {
    pub fn should_skip(&self) -> bool {
        matches!(self, GateVerdict::Skip)
    }
}

pub struct JobGate;

impl JobGate {
    pub fn evaluate(changes_detected: bool) -> GateVerdict {
        if changes_detected {
            GateVerdict::Proceed
        } else {
            GateVerdict::Skip
        }
    }

    /// Read the decision and evaluate it.
    ///
    /// Only call once the job's dependency on the detector is satisfied;
    /// a missing decision is returned as `DecisionNotFound`.
    pub async fn check(store: &dyn DecisionStore, key: &str) -> Result<GateVerdict> {
        Ok(Self::evaluate(store.get_flag(key).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDecisionStore;
    use tollgate_core::Error;

    #[test]
    fn test_evaluate() {
        assert_eq!(JobGate::evaluate(true), GateVerdict::Proceed);
        assert_eq!(JobGate::evaluate(false), GateVerdict::Skip);
        assert!(JobGate::evaluate(false).should_skip());
    }

    #[tokio::test]
    async fn test_check_reads_store() {
        let store = InMemoryDecisionStore::new();
        assert!(matches!(
            JobGate::check(&store, "changes_detected").await,
            Err(Error::DecisionNotFound(_))
        ));
        store.put_flag("changes_detected", false).await.unwrap();
        assert_eq!(
            JobGate::check(&store, "changes_detected").await.unwrap(),
            GateVerdict::Skip
        );
    }
}
