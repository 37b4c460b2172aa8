//! Command handlers.
//!
//! Every handler returns whether the command succeeded; `main` turns
//! `false` into a non-zero exit status.

use crate::commands::ChangeArgs;
use crate::config::{CliConfig, OutputFormat};
use crate::executor::{ExecutorConfig, LocalExecutor};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tollgate_core::ports::DiffProvider;
use tollgate_core::run::{JobOutcome, RevisionPair, RunReport};
use tollgate_core::workflow::WorkflowDefinition;
use tollgate_runner::{GitDiffProvider, StaticDiffProvider};
use tollgate_scheduler::{ChangeDetector, GatePolicy, MatrixExpander, cancellation};

type HandlerResult = Result<bool, Box<dyn std::error::Error>>;

const TEMPLATE: &str = r#"version: "1"
name: ci

change_detection:
  patterns: ["src/", "tests/"]

matrix:
  axes:
    runtime_version: ["3.11", "3.12"]
    task_type: ["tests", "lint"]
  instances:
    - { runtime_version: "3.11", task_type: tests }
    - { runtime_version: "3.12", task_type: tests, always_run: true }
    - { runtime_version: "3.12", task_type: lint, always_run: true }

task:
  run: |
    echo "Running ${{ matrix.task_type }} on ${{ matrix.runtime_version }}"
    # Add your commands here
"#;

/// Write a starter workflow.
pub async fn init() -> HandlerResult {
    let path = Path::new("tollgate.yaml");

    if path.exists() {
        println!("{} tollgate.yaml already exists", style("!").yellow());
        return Ok(true);
    }

    std::fs::write(path, TEMPLATE)?;
    println!("{} Created tollgate.yaml", style("✓").green());
    Ok(true)
}

/// Validate a workflow file, including its matrix.
pub async fn validate(path: &Path) -> HandlerResult {
    let workflow = WorkflowDefinition::from_path(path)?;
    let expansion = MatrixExpander::new().expand(&workflow.name, &workflow.matrix)?;

    println!(
        "{} Workflow \"{}\" is valid",
        style("✓").green(),
        workflow.name
    );
    println!("  Axes:");
    for (axis, values) in &workflow.matrix.axes {
        println!("    - {} ({})", axis, values.join(", "));
    }
    println!(
        "  Jobs: {} ({} always run)",
        expansion.len(),
        expansion.always_run_count()
    );
    if workflow.change_detection.patterns.is_empty() {
        println!(
            "  {} No change patterns: every change is relevant",
            style("i").blue()
        );
    }

    Ok(true)
}

/// Print every job instance with its gating.
pub async fn expand(path: &Path) -> HandlerResult {
    let workflow = WorkflowDefinition::from_path(path)?;
    let expander = MatrixExpander::new();
    let expansion = expander.expand(&workflow.name, &workflow.matrix)?;
    let graph = expander.wire(&expansion, GatePolicy::default())?;

    println!("{}", style(&workflow.name).bold());
    for job in graph.jobs() {
        let gating = if graph.depends_on_detector(job.id) {
            style("gated on changes").dim()
        } else {
            style("always runs").cyan()
        };
        println!("  {:>3}  {}  {}", job.index, job.display_name, gating);
    }

    Ok(true)
}

/// Evaluate the change decision only.
pub async fn detect(
    config: &CliConfig,
    path: &Path,
    changes: &ChangeArgs,
    output: Option<OutputFormat>,
) -> HandlerResult {
    let workflow = WorkflowDefinition::from_path(path)?;
    let workspace = config
        .workspace
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let diff = diff_provider(changes, &workspace)?;
    let detector = ChangeDetector::from_config(&workflow.change_detection, diff);
    let revisions = RevisionPair::new(&changes.base, &changes.head);
    let decision = detector.evaluate(&revisions).await?;

    match output.unwrap_or(config.output_format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&decision)?),
        OutputFormat::Table => {
            let marker = if decision.changes_detected {
                style("✓").green()
            } else {
                style("⏭").dim()
            };
            println!(
                "{} {} = {}",
                marker,
                detector.decision_key(),
                decision.changes_detected
            );
            println!("  {} ({})", decision, style(&revisions).dim());
        }
    }

    Ok(true)
}

/// Options for `run` collected from the command line.
pub struct RunOptions {
    pub changes: ChangeArgs,
    pub workspace: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
    pub keep_store: bool,
    pub max_parallel: Option<usize>,
    pub output: Option<OutputFormat>,
    pub verbose: bool,
}

/// Run a workflow locally.
pub async fn run_workflow(config: &CliConfig, path: &Path, options: RunOptions) -> HandlerResult {
    let workflow = WorkflowDefinition::from_path(path)?;
    let output = options.output.unwrap_or(config.output_format);

    let workspace = match options.workspace.or_else(|| config.workspace.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let diff = diff_provider(&options.changes, &workspace)?;
    let revisions = RevisionPair::new(&options.changes.base, &options.changes.head);

    let (handle, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{} Cancelling: jobs that have not started will not run",
                style("!").yellow()
            );
            handle.cancel();
        }
    });

    let executor = LocalExecutor::new(ExecutorConfig {
        workspace,
        store_dir: options
            .store_dir
            .unwrap_or_else(|| config.resolved_store_dir()),
        max_parallel: options.max_parallel.or(config.max_parallel),
        keep_store: options.keep_store,
        progress: output == OutputFormat::Table,
        verbose: options.verbose,
    });
    let report = executor.run(&workflow, revisions, diff, signal).await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_summary(&report),
    }

    Ok(!report.has_failures())
}

fn diff_provider(
    changes: &ChangeArgs,
    workspace: &Path,
) -> Result<Arc<dyn DiffProvider>, Box<dyn std::error::Error>> {
    let diff: Arc<dyn DiffProvider> = match &changes.changed_from {
        Some(path) => Arc::new(StaticDiffProvider::from_path(path)?),
        None => Arc::new(GitDiffProvider::new(workspace)),
    };
    Ok(diff)
}

fn print_summary(report: &RunReport) {
    let summary = report.summary();

    println!();
    for job in report.jobs.iter().filter(|j| j.outcome.is_failure()) {
        let detail = job.message.as_deref().unwrap_or("");
        let label = match job.outcome {
            JobOutcome::UpstreamFailure => "upstream failure",
            _ => "failed",
        };
        println!(
            "  {} {} ({}) {}",
            style("✗").red(),
            job.display_name,
            label,
            style(detail).dim()
        );
    }

    let line = format!(
        "{} succeeded, {} failed, {} skipped, {} upstream failures, {} cancelled in {}ms",
        summary.succeeded,
        summary.failed,
        summary.skipped,
        summary.upstream_failure,
        summary.cancelled,
        report.duration_ms
    );
    if report.has_failures() {
        println!("{} {}", style("✗").red().bold(), line);
    } else {
        println!("{} {}", style("✓").green().bold(), line);
    }
}

/// Print the workflow JSON schema.
pub fn schema() -> HandlerResult {
    let schema = schemars::schema_for!(WorkflowDefinition);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(true)
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> HandlerResult {
    println!("Current configuration:");
    println!(
        "  workspace: {}",
        config
            .workspace
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(current directory)".to_string())
    );
    println!("  store_dir: {}", config.resolved_store_dir().display());
    println!(
        "  max_parallel: {}",
        config
            .max_parallel
            .map(|n| n.to_string())
            .unwrap_or_else(|| "(unlimited)".to_string())
    );
    println!("  output_format: {:?}", config.output_format);

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(true)
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(true)
}
