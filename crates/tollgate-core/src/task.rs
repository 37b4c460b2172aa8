//! Task body inputs and results.

use crate::ids::{JobId, RunId};
use crate::workflow::{JobParameters, TaskDefinition};
use std::collections::HashMap;
use std::path::PathBuf;

/// Everything a task executor needs to run one job instance.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: RunId,
    pub job_id: JobId,
    pub display_name: String,
    pub parameters: JobParameters,
    pub variables: HashMap<String, String>,
    pub task: TaskDefinition,
    pub workspace: PathBuf,
}

impl TaskContext {
    /// Environment exposed to the task body.
    ///
    /// Workflow and task variables come first, then one upper-cased variable
    /// per matrix axis, then the run and job identifiers.
    pub fn environment(&self) -> HashMap<String, String> {
        let mut env = self.variables.clone();
        env.extend(self.task.variables.clone());
        for (axis, value) in &self.parameters {
            env.insert(axis_env_name(axis), value.clone());
        }
        env.insert("TOLLGATE_RUN_ID".into(), self.run_id.to_string());
        env.insert("TOLLGATE_JOB_ID".into(), self.job_id.to_string());
        env.insert("TOLLGATE_JOB_NAME".into(), self.display_name.clone());
        env
    }

    pub fn working_directory(&self) -> PathBuf {
        match &self.task.working_directory {
            Some(dir) => self.workspace.join(dir),
            None => self.workspace.clone(),
        }
    }
}

/// `runtime-version` becomes `RUNTIME_VERSION`.
pub fn axis_env_name(axis: &str) -> String {
    axis.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Result of running a task body.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub exit_code: i32,
    pub success: bool,
    pub duration_ms: u64,
}
