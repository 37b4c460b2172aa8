//! Run lifecycle events.

use crate::ids::{JobId, RunId};
use crate::run::{Decision, JobOutcome, RevisionPair, RunSummary};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All events emitted during a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted(RunStartedPayload),
    MatrixExpanded(MatrixExpandedPayload),
    DecisionRecorded(DecisionRecordedPayload),
    DetectorFailed(DetectorFailedPayload),
    JobStarted(JobStartedPayload),
    JobOutput(JobOutputPayload),
    JobCompleted(JobCompletedPayload),
    RunCancelled(RunCancelledPayload),
    RunCompleted(RunCompletedPayload),
}

impl Event {
    /// Subject name for routing and filtering.
    pub fn subject(&self) -> String {
        match self {
            Event::RunStarted(p) => format!("run.started.{}", p.run_id),
            Event::MatrixExpanded(p) => format!("matrix.expanded.{}", p.run_id),
            Event::DecisionRecorded(p) => format!("decision.recorded.{}", p.run_id),
            Event::DetectorFailed(p) => format!("decision.failed.{}", p.run_id),
            Event::JobStarted(p) => format!("job.started.{}.{}", p.run_id, p.job_id),
            Event::JobOutput(p) => format!("job.output.{}.{}", p.run_id, p.job_id),
            Event::JobCompleted(p) => format!("job.completed.{}.{}", p.run_id, p.job_id),
            Event::RunCancelled(p) => format!("run.cancelled.{}", p.run_id),
            Event::RunCompleted(p) => format!("run.completed.{}", p.run_id),
        }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunStarted(p) => p.run_id,
            Event::MatrixExpanded(p) => p.run_id,
            Event::DecisionRecorded(p) => p.run_id,
            Event::DetectorFailed(p) => p.run_id,
            Event::JobStarted(p) => p.run_id,
            Event::JobOutput(p) => p.run_id,
            Event::JobCompleted(p) => p.run_id,
            Event::RunCancelled(p) => p.run_id,
            Event::RunCompleted(p) => p.run_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunStartedPayload {
    pub run_id: RunId,
    pub workflow_name: String,
    pub revisions: RevisionPair,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixExpandedPayload {
    pub run_id: RunId,
    pub job_count: usize,
    pub gated_count: usize,
    pub always_run_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecisionRecordedPayload {
    pub run_id: RunId,
    pub key: String,
    pub decision: Decision,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectorFailedPayload {
    pub run_id: RunId,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStartedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub display_name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobOutputPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub line: String,
    pub is_stderr: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobCompletedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub display_name: String,
    pub outcome: JobOutcome,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCancelledPayload {
    pub run_id: RunId,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCompletedPayload {
    pub run_id: RunId,
    pub workflow_name: String,
    pub summary: RunSummary,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}
