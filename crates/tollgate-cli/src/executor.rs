//! Local workflow executor for running workflows without a server.
//!
//! Wires the scheduler to a shell task executor, a run-scoped file decision
//! store, and a broadcast event bus rendered as live console progress.

use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tollgate_core::events::Event;
use tollgate_core::ports::{DiffProvider, EventBus};
use tollgate_core::run::{JobOutcome, RevisionPair, RunReport};
use tollgate_core::workflow::WorkflowDefinition;
use tollgate_core::{Result, RunId};
use tollgate_runner::{RunnerConfig, ShellTaskExecutor};
use tollgate_scheduler::{
    BroadcastEventBus, CancelSignal, ChangeDetector, FileDecisionStore, Scheduler,
    SchedulerConfig,
};
use tracing::warn;

/// Local executor configuration.
pub struct ExecutorConfig {
    pub workspace: PathBuf,
    pub store_dir: PathBuf,
    pub max_parallel: Option<usize>,
    pub keep_store: bool,
    /// Render progress on the console.
    pub progress: bool,
    /// Echo task output lines with the progress.
    pub verbose: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            store_dir: std::env::temp_dir().join("tollgate-runs"),
            max_parallel: None,
            keep_store: false,
            progress: true,
            verbose: false,
        }
    }
}

/// Runs one workflow on this machine.
pub struct LocalExecutor {
    config: ExecutorConfig,
}

impl LocalExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        workflow: &WorkflowDefinition,
        revisions: RevisionPair,
        diff: Arc<dyn DiffProvider>,
        cancel: CancelSignal,
    ) -> Result<RunReport> {
        let run_id = RunId::new();
        let store = Arc::new(FileDecisionStore::open(&self.config.store_dir, run_id).await?);

        let bus = Arc::new(BroadcastEventBus::default());
        let printer = self.config.progress.then(|| {
            tokio::spawn(render_progress(bus.subscribe(), self.config.verbose))
        });

        let result = {
            let event_bus: Arc<dyn EventBus> = bus;
            let executor = ShellTaskExecutor::new(RunnerConfig {
                publish_output: self.config.verbose,
                ..Default::default()
            })
            .with_event_bus(event_bus.clone());

            let scheduler = Scheduler::new(
                ChangeDetector::from_config(&workflow.change_detection, diff),
                Arc::new(executor),
                event_bus,
                SchedulerConfig {
                    workspace: self.config.workspace.clone(),
                    max_parallel: self.config.max_parallel,
                    ..Default::default()
                },
            );

            scheduler
                .run(run_id, workflow, revisions, store.clone(), cancel)
                .await
        };

        // every sender is gone once the scheduler is dropped
        if let Some(printer) = printer {
            let _ = printer.await;
        }

        if self.config.keep_store {
            println!(
                "  {} Decision store kept at {}",
                style("i").blue(),
                store.dir().display()
            );
        } else if let Ok(store) = Arc::try_unwrap(store) {
            if let Err(e) = store.teardown().await {
                warn!(error = %e, "Failed to remove decision store");
            }
        }

        result
    }
}

/// Print run events until the bus closes.
async fn render_progress(mut rx: broadcast::Receiver<Event>, verbose: bool) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress output fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            Event::RunStarted(p) => println!(
                "{} Running {} ({})",
                style("▶").cyan().bold(),
                style(&p.workflow_name).bold(),
                style(&p.revisions).dim()
            ),
            Event::MatrixExpanded(p) => println!(
                "  {} jobs, {} gated on changes, {} always run",
                p.job_count, p.gated_count, p.always_run_count
            ),
            Event::DecisionRecorded(p) => println!(
                "{} {} = {} ({})",
                style("◆").cyan(),
                p.key,
                p.decision.changes_detected,
                p.decision
            ),
            Event::DetectorFailed(p) => println!(
                "{} Change detection failed: {}",
                style("✗").red().bold(),
                p.error
            ),
            Event::JobStarted(p) => {
                println!("  {} {}", style("▶").cyan(), style(&p.display_name).bold())
            }
            Event::JobOutput(p) if verbose => {
                if p.is_stderr {
                    println!("      | {}", style(&p.line).yellow());
                } else {
                    println!("      | {}", p.line);
                }
            }
            Event::JobOutput(_) => {}
            Event::JobCompleted(p) => {
                let marker = match p.outcome {
                    JobOutcome::Succeeded => style("✓").green(),
                    JobOutcome::Failed | JobOutcome::UpstreamFailure => style("✗").red(),
                    JobOutcome::Skipped => style("⏭").dim(),
                    JobOutcome::Cancelled => style("⊘").yellow(),
                };
                let duration = p
                    .duration_ms
                    .map(|ms| format!(" in {}ms", ms))
                    .unwrap_or_default();
                println!(
                    "  {} {} {}{}",
                    marker,
                    p.display_name,
                    style(p.outcome).dim(),
                    duration
                );
            }
            Event::RunCancelled(_) => {
                println!("{} Run cancelled", style("⊘").yellow().bold())
            }
            Event::RunCompleted(_) => {}
        }
    }
}
