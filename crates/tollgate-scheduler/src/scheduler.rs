//! Workflow run orchestration.
//!
//! One run expands the matrix, starts every job instance as its own task,
//! and runs the change detector alongside them. Gated jobs wait on a watch
//! channel that is only released after the decision has been written to the
//! store, so no gated task body can start before the write completes.

use crate::cancel::CancelSignal;
use crate::dag::GatePolicy;
use crate::detector::ChangeDetector;
use crate::gate::{GateVerdict, JobGate};
use crate::matrix::{JobInstance, MatrixExpander};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinSet;
use tollgate_core::events::*;
use tollgate_core::ids::RunId;
use tollgate_core::ports::{DecisionStore, EventBus, TaskExecutor};
use tollgate_core::run::{JobOutcome, JobReport, JobState, RevisionPair, RunReport};
use tollgate_core::task::TaskContext;
use tollgate_core::workflow::{TaskDefinition, WorkflowDefinition};
use tollgate_core::{Error, Result};
use tracing::{debug, error, info, warn};

/// Scheduler settings that are not part of the workflow file.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workspace: PathBuf,
    /// Overrides the workflow's `max_parallel` when set.
    pub max_parallel: Option<usize>,
    pub gate_policy: GatePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_parallel: None,
            gate_policy: GatePolicy::default(),
        }
    }
}

/// Progress of the detector as seen by gated jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorStatus {
    Pending,
    Ready,
    Failed,
    Cancelled,
}

/// The main scheduler service.
pub struct Scheduler {
    detector: ChangeDetector,
    executor: Arc<dyn TaskExecutor>,
    event_bus: Arc<dyn EventBus>,
    matrix_expander: MatrixExpander,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        detector: ChangeDetector,
        executor: Arc<dyn TaskExecutor>,
        event_bus: Arc<dyn EventBus>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            detector,
            executor,
            event_bus,
            matrix_expander: MatrixExpander::new(),
            config,
        }
    }

    /// Execute one workflow run to completion.
    ///
    /// Configuration errors are returned before any job starts. Once jobs
    /// are running, every outcome (including detector failure) is reported
    /// through the returned `RunReport`.
    pub async fn run(
        &self,
        run_id: RunId,
        workflow: &WorkflowDefinition,
        revisions: RevisionPair,
        store: Arc<dyn DecisionStore>,
        cancel: CancelSignal,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        workflow.validate()?;
        let expansion = self
            .matrix_expander
            .expand(&workflow.name, &workflow.matrix)?;
        let graph = self
            .matrix_expander
            .wire(&expansion, self.config.gate_policy)?;
        let gated_count = graph.dependents().len();

        info!(
            run_id = %run_id,
            workflow = %workflow.name,
            revisions = %revisions,
            jobs = graph.job_count(),
            gated = gated_count,
            "Starting workflow run"
        );

        emit(
            self.event_bus.as_ref(),
            Event::RunStarted(RunStartedPayload {
                run_id,
                workflow_name: workflow.name.clone(),
                revisions: revisions.clone(),
                started_at,
            }),
        )
        .await;
        emit(
            self.event_bus.as_ref(),
            Event::MatrixExpanded(MatrixExpandedPayload {
                run_id,
                job_count: graph.job_count(),
                gated_count,
                always_run_count: graph.job_count() - gated_count,
            }),
        )
        .await;

        let (status_tx, status_rx) = watch::channel(DetectorStatus::Pending);
        let permits = self
            .config
            .max_parallel
            .or(expansion.max_parallel.map(|n| n as usize))
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let mut join_set = JoinSet::new();
        for job in graph.jobs() {
            let worker = JobWorker {
                run_id,
                job: job.clone(),
                gated: graph.depends_on_detector(job.id),
                task: workflow.task.clone(),
                variables: workflow.variables.clone(),
                workspace: self.config.workspace.clone(),
                decision_key: self.detector.decision_key().to_string(),
                executor: self.executor.clone(),
                event_bus: self.event_bus.clone(),
                store: store.clone(),
                detector_status: status_rx.clone(),
                cancel: cancel.clone(),
                permits: permits.clone(),
            };
            join_set.spawn(worker.run());
        }
        drop(status_rx);

        let (decision, detector_error) = {
            let mut cancel = cancel.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(run_id = %run_id, "Run cancelled before change detection finished");
                    status_tx.send_replace(DetectorStatus::Cancelled);
                    (None, Some("cancelled".to_string()))
                }
                result = self.detector.detect(&revisions, store.as_ref()) => match result {
                    Ok(decision) => {
                        emit(
                            self.event_bus.as_ref(),
                            Event::DecisionRecorded(DecisionRecordedPayload {
                                run_id,
                                key: self.detector.decision_key().to_string(),
                                decision: decision.clone(),
                                recorded_at: Utc::now(),
                            }),
                        )
                        .await;
                        status_tx.send_replace(DetectorStatus::Ready);
                        (Some(decision), None)
                    }
                    Err(e) => {
                        error!(run_id = %run_id, error = %e, "Change detection failed");
                        emit(
                            self.event_bus.as_ref(),
                            Event::DetectorFailed(DetectorFailedPayload {
                                run_id,
                                error: e.to_string(),
                            }),
                        )
                        .await;
                        status_tx.send_replace(DetectorStatus::Failed);
                        (None, Some(e.to_string()))
                    }
                },
            }
        };

        let mut jobs = Vec::with_capacity(graph.job_count());
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(report) => jobs.push(report),
                Err(e) => return Err(Error::Internal(format!("job task failed: {}", e))),
            }
        }
        jobs.sort_by_key(|j| j.index);

        let completed_at = Utc::now();
        let report = RunReport {
            run_id,
            workflow_name: workflow.name.clone(),
            revisions,
            decision,
            detector_error,
            jobs,
            started_at,
            completed_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if cancel.is_cancelled() {
            emit(
                self.event_bus.as_ref(),
                Event::RunCancelled(RunCancelledPayload {
                    run_id,
                    cancelled_at: completed_at,
                }),
            )
            .await;
        }

        let summary = report.summary();
        info!(
            run_id = %run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            upstream_failure = summary.upstream_failure,
            cancelled = summary.cancelled,
            duration_ms = report.duration_ms,
            "Workflow run completed"
        );
        emit(
            self.event_bus.as_ref(),
            Event::RunCompleted(RunCompletedPayload {
                run_id,
                workflow_name: report.workflow_name.clone(),
                summary,
                duration_ms: report.duration_ms,
                completed_at,
            }),
        )
        .await;

        Ok(report)
    }
}

/// Publish an event; a failing bus never fails the run.
async fn emit(bus: &dyn EventBus, event: Event) {
    let subject = event.subject();
    if let Err(e) = bus.publish(event).await {
        warn!(subject = %subject, error = %e, "Failed to publish event");
    }
}

/// Drives one job instance through its lifecycle.
struct JobWorker {
    run_id: RunId,
    job: JobInstance,
    gated: bool,
    task: TaskDefinition,
    variables: HashMap<String, String>,
    workspace: PathBuf,
    decision_key: String,
    executor: Arc<dyn TaskExecutor>,
    event_bus: Arc<dyn EventBus>,
    store: Arc<dyn DecisionStore>,
    detector_status: watch::Receiver<DetectorStatus>,
    cancel: CancelSignal,
    permits: Option<Arc<Semaphore>>,
}

/// Fields of a job report that depend on how the job ended.
#[derive(Default)]
struct Ending {
    exit_code: Option<i32>,
    message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    duration_ms: Option<u64>,
}

impl Ending {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

impl JobWorker {
    async fn run(mut self) -> JobReport {
        self.transition(JobState::Scheduled);
        if self.cancel.is_cancelled() {
            return self
                .finish(JobOutcome::Cancelled, Ending::message("run cancelled"))
                .await;
        }

        if self.gated {
            self.transition(JobState::WaitingOnDependency);
            match self.wait_for_detector().await {
                DetectorStatus::Ready => {}
                DetectorStatus::Cancelled => {
                    return self
                        .finish(JobOutcome::Cancelled, Ending::message("run cancelled"))
                        .await;
                }
                DetectorStatus::Failed | DetectorStatus::Pending => {
                    return self
                        .finish(
                            JobOutcome::UpstreamFailure,
                            Ending::message("change detection failed"),
                        )
                        .await;
                }
            }

            self.transition(JobState::Gated);
            match JobGate::check(self.store.as_ref(), &self.decision_key).await {
                Ok(GateVerdict::Proceed) => {}
                Ok(GateVerdict::Skip) => {
                    return self
                        .finish(JobOutcome::Skipped, Ending::message("no relevant changes"))
                        .await;
                }
                Err(e) => {
                    return self
                        .finish(
                            JobOutcome::UpstreamFailure,
                            Ending::message(format!("decision unavailable: {}", e)),
                        )
                        .await;
                }
            }
        }

        let _permit = match self.acquire_permit().await {
            Some(permit) => permit,
            None => {
                return self
                    .finish(JobOutcome::Cancelled, Ending::message("run cancelled"))
                    .await;
            }
        };
        if self.cancel.is_cancelled() {
            return self
                .finish(JobOutcome::Cancelled, Ending::message("run cancelled"))
                .await;
        }

        self.execute().await
    }

    async fn wait_for_detector(&mut self) -> DetectorStatus {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => DetectorStatus::Cancelled,
            status = self
                .detector_status
                .wait_for(|s| *s != DetectorStatus::Pending) => match status {
                Ok(status) => *status,
                Err(_) => DetectorStatus::Failed,
            },
        }
    }

    /// `None` when the run is cancelled while waiting for a slot.
    async fn acquire_permit(&self) -> Option<Option<OwnedSemaphorePermit>> {
        let Some(semaphore) = &self.permits else {
            return Some(None);
        };
        let mut cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok().map(Some),
        }
    }

    async fn execute(&self) -> JobReport {
        self.transition(JobState::Running);
        let started_at = Utc::now();
        emit(
            self.event_bus.as_ref(),
            Event::JobStarted(JobStartedPayload {
                run_id: self.run_id,
                job_id: self.job.id,
                display_name: self.job.display_name.clone(),
                started_at,
            }),
        )
        .await;

        let ctx = TaskContext {
            run_id: self.run_id,
            job_id: self.job.id,
            display_name: self.job.display_name.clone(),
            parameters: self.job.parameters.clone(),
            variables: self.variables.clone(),
            task: self.task.clone(),
            workspace: self.workspace.clone(),
        };

        let start = Instant::now();
        let (outcome, exit_code, message) = match self.executor.execute(&ctx).await {
            Ok(result) if result.success => (JobOutcome::Succeeded, Some(result.exit_code), None),
            Ok(result) => (
                JobOutcome::Failed,
                Some(result.exit_code),
                Some(format!("task exited with code {}", result.exit_code)),
            ),
            Err(e) => (JobOutcome::Failed, None, Some(e.to_string())),
        };

        self.finish(
            outcome,
            Ending {
                exit_code,
                message,
                started_at: Some(started_at),
                duration_ms: Some(start.elapsed().as_millis() as u64),
            },
        )
        .await
    }

    fn transition(&self, state: JobState) {
        debug!(
            run_id = %self.run_id,
            job = %self.job.display_name,
            state = ?state,
            terminal = state.is_terminal(),
            "Job state"
        );
    }

    async fn finish(&self, outcome: JobOutcome, ending: Ending) -> JobReport {
        self.transition(JobState::from(outcome));
        match outcome {
            JobOutcome::Failed | JobOutcome::UpstreamFailure => warn!(
                run_id = %self.run_id,
                job = %self.job.display_name,
                outcome = %outcome,
                message = ending.message.as_deref().unwrap_or(""),
                "Job finished"
            ),
            _ => info!(
                run_id = %self.run_id,
                job = %self.job.display_name,
                outcome = %outcome,
                "Job finished"
            ),
        }

        emit(
            self.event_bus.as_ref(),
            Event::JobCompleted(JobCompletedPayload {
                run_id: self.run_id,
                job_id: self.job.id,
                display_name: self.job.display_name.clone(),
                outcome,
                exit_code: ending.exit_code,
                duration_ms: ending.duration_ms,
            }),
        )
        .await;

        JobReport {
            job_id: self.job.id,
            index: self.job.index,
            display_name: self.job.display_name.clone(),
            parameters: self.job.parameters.clone(),
            always_run: self.job.always_run,
            gated: self.gated,
            outcome,
            exit_code: ending.exit_code,
            message: ending.message,
            started_at: ending.started_at,
            completed_at: Utc::now(),
            duration_ms: ending.duration_ms,
        }
    }
}
