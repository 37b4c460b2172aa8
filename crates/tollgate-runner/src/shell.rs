//! Shell-based task execution on the host.

use crate::runner::{OutputLine, OutputStream, RunnerConfig};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tollgate_core::events::{Event, JobOutputPayload};
use tollgate_core::interpolation::InterpolationContext;
use tollgate_core::ports::{EventBus, TaskExecutor};
use tollgate_core::task::{TaskContext, TaskResult};
use tollgate_core::{Error, Result};
use tracing::{debug, info, warn};

/// Runs each job's task command through its configured shell.
pub struct ShellTaskExecutor {
    config: RunnerConfig,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl ShellTaskExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            event_bus: None,
        }
    }

    /// Publish output lines on the given bus.
    pub fn with_event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// The task command with `${{ ... }}` expressions resolved for this job.
    pub fn render_command(ctx: &TaskContext) -> String {
        let mut variables = ctx.variables.clone();
        variables.extend(ctx.task.variables.clone());
        InterpolationContext::new()
            .with_variables(variables)
            .with_matrix(ctx.parameters.clone())
            .interpolate(&ctx.task.run)
    }

    async fn execute_command(&self, command: &str, ctx: &TaskContext) -> Result<TaskResult> {
        let start = std::time::Instant::now();
        let workdir = ctx.working_directory();

        info!(
            job = %ctx.display_name,
            command = %command,
            workdir = %workdir.display(),
            "Executing task"
        );

        let mut child = Command::new(&ctx.task.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&workdir)
            .envs(ctx.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::TaskSpawn(format!("{}: {}", ctx.task.shell, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::TaskSpawn("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::TaskSpawn("stderr was not captured".into()))?;

        let (output_tx, output_rx) = mpsc::channel(256);
        let stdout_handle = tokio::spawn(stream_lines(stdout, OutputStream::Stdout, output_tx.clone()));
        let stderr_handle = tokio::spawn(stream_lines(stderr, OutputStream::Stderr, output_tx));
        let forward_handle = tokio::spawn(forward_output(
            output_rx,
            ctx.clone(),
            self.config.publish_output.then(|| self.event_bus.clone()).flatten(),
        ));

        let timeout_secs = self.config.effective_timeout(ctx.task.timeout_minutes);
        let wait_result = match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(job = %ctx.display_name, timeout_secs, "Task timed out, killing process");
                let _ = child.kill().await;
                return Err(Error::TaskTimeout {
                    seconds: timeout_secs,
                });
            }
        };

        let _ = stdout_handle.await;
        let _ = stderr_handle.await;
        let _ = forward_handle.await;

        let status = wait_result
            .map_err(|e| Error::Internal(format!("Failed to wait for task: {}", e)))?;

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(job = %ctx.display_name, exit_code, duration_ms, "Task completed");

        Ok(TaskResult {
            exit_code,
            success: exit_code == 0,
            duration_ms,
        })
    }
}

impl Default for ShellTaskExecutor {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[async_trait]
impl TaskExecutor for ShellTaskExecutor {
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskResult> {
        let command = Self::render_command(ctx);
        self.execute_command(&command, ctx).await
    }
}

async fn stream_lines<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line_number = 0u32;

    while let Ok(Some(line)) = lines.next_line().await {
        line_number += 1;
        let output = OutputLine {
            stream,
            content: line,
            line_number,
            timestamp: chrono::Utc::now(),
        };
        if tx.send(output).await.is_err() {
            break;
        }
    }
}

async fn forward_output(
    mut rx: mpsc::Receiver<OutputLine>,
    ctx: TaskContext,
    event_bus: Option<Arc<dyn EventBus>>,
) {
    while let Some(line) = rx.recv().await {
        debug!(
            job = %ctx.display_name,
            stderr = line.stream.is_stderr(),
            line = line.line_number,
            "{}",
            line.content
        );

        if let Some(bus) = &event_bus {
            let event = Event::JobOutput(JobOutputPayload {
                run_id: ctx.run_id,
                job_id: ctx.job_id,
                line: line.content,
                is_stderr: line.stream.is_stderr(),
            });
            if let Err(e) = bus.publish(event).await {
                warn!(error = %e, "Failed to publish task output");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tollgate_core::ids::{JobId, RunId};
    use tollgate_core::workflow::{JobParameters, TaskDefinition};
    use tollgate_scheduler::RecordingEventBus;

    fn context(cmd: &str, version: &str) -> TaskContext {
        let mut parameters = JobParameters::new();
        parameters.insert("runtime_version".into(), version.into());
        parameters.insert("task_type".into(), "tests".into());

        TaskContext {
            run_id: RunId::new(),
            job_id: JobId::new(),
            display_name: format!("ci (runtime_version={}, task_type=tests)", version),
            parameters,
            variables: HashMap::from([("GREETING".to_string(), "hello".to_string())]),
            task: TaskDefinition {
                run: cmd.to_string(),
                shell: "sh".to_string(),
                working_directory: None,
                timeout_minutes: 30,
                variables: HashMap::new(),
            },
            workspace: std::env::temp_dir(),
        }
    }

    fn output_lines(bus: &RecordingEventBus) -> Vec<(String, bool)> {
        bus.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::JobOutput(p) => Some((p.line, p.is_stderr)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_shell_executor_success() {
        let bus = Arc::new(RecordingEventBus::new());
        let executor = ShellTaskExecutor::default().with_event_bus(bus.clone());

        let result = executor
            .execute(&context("echo $GREETING $RUNTIME_VERSION", "3.9"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(output_lines(&bus), [("hello 3.9".to_string(), false)]);
    }

    #[tokio::test]
    async fn test_shell_executor_failure() {
        let executor = ShellTaskExecutor::default();
        let result = executor
            .execute(&context("echo oops >&2; exit 3", "3.8"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_matrix_interpolation() {
        let ctx = context("make ${{ matrix.task_type }} PY=${{ matrix.runtime_version }}", "3.12");
        assert_eq!(ShellTaskExecutor::render_command(&ctx), "make tests PY=3.12");

        let bus = Arc::new(RecordingEventBus::new());
        let executor = ShellTaskExecutor::default().with_event_bus(bus.clone());
        executor
            .execute(&context("echo ${{ matrix.runtime_version }}", "3.11"))
            .await
            .unwrap();
        assert_eq!(output_lines(&bus)[0].0, "3.11");
    }

    #[tokio::test]
    async fn test_stderr_is_tagged() {
        let bus = Arc::new(RecordingEventBus::new());
        let executor = ShellTaskExecutor::default().with_event_bus(bus.clone());
        executor
            .execute(&context("echo warn >&2", "3.10"))
            .await
            .unwrap();
        assert_eq!(output_lines(&bus), [("warn".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_timeout_kills_task() {
        let executor = ShellTaskExecutor::new(RunnerConfig {
            timeout_seconds: Some(1),
            ..Default::default()
        });
        let err = executor
            .execute(&context("sleep 5", "3.9"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskTimeout { seconds: 1 }));
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let mut ctx = context("true", "3.9");
        ctx.task.shell = "/nonexistent/shell".into();
        let err = ShellTaskExecutor::default().execute(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::TaskSpawn(_)));
    }
}
