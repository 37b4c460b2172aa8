//! Run and execution types.

use crate::ids::{JobId, RunId};
use crate::workflow::JobParameters;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The (base, head) revisions bounding a change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RevisionPair {
    pub base: String,
    pub head: String,
}

impl RevisionPair {
    pub fn new(base: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            head: head.into(),
        }
    }
}

impl fmt::Display for RevisionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.base, self.head)
    }
}

/// Outcome of change detection for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    pub changes_detected: bool,
    pub reason: DecisionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// A changed path matched a configured pattern.
    Matched { path: String, pattern: String },
    /// None of the changed paths matched.
    NoMatch { paths_considered: usize },
    /// The base revision had no comparable parent; assumed changed.
    NoComparableParent { detail: String },
}

impl Decision {
    pub fn matched(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            changes_detected: true,
            reason: DecisionReason::Matched {
                path: path.into(),
                pattern: pattern.into(),
            },
        }
    }

    pub fn no_match(paths_considered: usize) -> Self {
        Self {
            changes_detected: false,
            reason: DecisionReason::NoMatch { paths_considered },
        }
    }

    pub fn no_comparable_parent(detail: impl Into<String>) -> Self {
        Self {
            changes_detected: true,
            reason: DecisionReason::NoComparableParent {
                detail: detail.into(),
            },
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            DecisionReason::Matched { path, pattern } => {
                write!(f, "changes detected ({} matches {})", path, pattern)
            }
            DecisionReason::NoMatch { paths_considered } => write!(
                f,
                "no relevant changes ({} paths considered)",
                paths_considered
            ),
            DecisionReason::NoComparableParent { detail } => {
                write!(f, "changes assumed (no comparable parent: {})", detail)
            }
        }
    }
}

/// Lifecycle state of a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    WaitingOnDependency,
    Gated,
    Running,
    Succeeded,
    Failed,
    Skipped,
    UpstreamFailure,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobState::Scheduled | JobState::WaitingOnDependency | JobState::Gated | JobState::Running
        )
    }
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Succeeded => JobState::Succeeded,
            JobOutcome::Failed => JobState::Failed,
            JobOutcome::Skipped => JobState::Skipped,
            JobOutcome::UpstreamFailure => JobState::UpstreamFailure,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// Terminal outcome of a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Skipped,
    UpstreamFailure,
    Cancelled,
}

impl JobOutcome {
    /// Skipped and cancelled jobs never count as failures.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed | JobOutcome::UpstreamFailure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
            JobOutcome::Skipped => "skipped",
            JobOutcome::UpstreamFailure => "upstream_failure",
            JobOutcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobReport {
    pub job_id: JobId,
    pub index: usize,
    pub display_name: String,
    pub parameters: JobParameters,
    pub always_run: bool,
    /// Whether the job waited on the change decision.
    pub gated: bool,
    pub outcome: JobOutcome,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub upstream_failure: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => self.succeeded += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::UpstreamFailure => self.upstream_failure += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.upstream_failure + self.cancelled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub run_id: RunId,
    pub workflow_name: String,
    pub revisions: RevisionPair,
    pub decision: Option<Decision>,
    pub detector_error: Option<String>,
    pub jobs: Vec<JobReport>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for job in &self.jobs {
            summary.record(job.outcome);
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.jobs.iter().any(|j| j.outcome.is_failure())
    }

    pub fn was_cancelled(&self) -> bool {
        self.jobs.iter().any(|j| j.outcome == JobOutcome::Cancelled)
    }

    pub fn job(&self, display_name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.display_name == display_name)
    }
}
