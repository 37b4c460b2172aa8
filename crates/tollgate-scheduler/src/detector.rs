//! Change detection: decide whether a change set touches relevant paths.

use crate::patterns::PatternSet;
use std::sync::Arc;
use tollgate_core::Result;
use tollgate_core::ports::{DecisionStore, DiffProvider};
use tollgate_core::run::{Decision, RevisionPair};
use tollgate_core::workflow::{ChangeDetectionConfig, DEFAULT_DECISION_KEY};
use tracing::{debug, info, warn};

/// Computes the run's `changes_detected` decision.
pub struct ChangeDetector {
    patterns: PatternSet,
    diff: Arc<dyn DiffProvider>,
    decision_key: String,
}

impl ChangeDetector {
    pub fn new(patterns: PatternSet, diff: Arc<dyn DiffProvider>) -> Self {
        Self {
            patterns,
            diff,
            decision_key: DEFAULT_DECISION_KEY.to_string(),
        }
    }

    pub fn from_config(config: &ChangeDetectionConfig, diff: Arc<dyn DiffProvider>) -> Self {
        Self {
            patterns: PatternSet::new(&config.patterns),
            diff,
            decision_key: config.decision_key.clone(),
        }
    }

    pub fn with_decision_key(mut self, key: impl Into<String>) -> Self {
        self.decision_key = key.into();
        self
    }

    pub fn decision_key(&self) -> &str {
        &self.decision_key
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Decide from an already computed list of changed paths.
    pub fn decide<S: AsRef<str>>(&self, changed: &[S]) -> Decision {
        match self.patterns.find_relevant(changed) {
            Some((path, pattern)) => {
                debug!(path, pattern = %pattern, "Relevant change found");
                Decision::matched(path, pattern)
            }
            None => Decision::no_match(changed.len()),
        }
    }

    /// Compute the decision without recording it.
    ///
    /// Unresolvable revisions yield a conservative `true`; every other diff
    /// failure is returned to the caller.
    pub async fn evaluate(&self, revisions: &RevisionPair) -> Result<Decision> {
        match self.diff.changed_paths(revisions).await {
            Ok(paths) => {
                debug!(revisions = %revisions, changed = paths.len(), "Diff computed");
                Ok(self.decide(&paths))
            }
            Err(e) if e.is_revision_resolution() => {
                warn!(revisions = %revisions, error = %e, "No comparable parent, assuming changes");
                Ok(Decision::no_comparable_parent(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Compute the decision and write it to the store exactly once.
    pub async fn detect(
        &self,
        revisions: &RevisionPair,
        store: &dyn DecisionStore,
    ) -> Result<Decision> {
        let decision = self.evaluate(revisions).await?;
        store
            .put_flag(&self.decision_key, decision.changes_detected)
            .await?;
        info!(
            key = %self.decision_key,
            changes_detected = decision.changes_detected,
            "{}",
            decision
        );
        Ok(decision)
    }
}
