//! Workflow definition types.
//!
//! These types represent the user-authored workflow YAML configuration:
//! the path patterns that gate the run, the parameter matrix, and the
//! task body every job instance executes.

use crate::{Error, Result};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Parameters of one job instance, keyed by axis name in axis order.
pub type JobParameters = IndexMap<String, String>;

/// Store key used for the change decision unless configured otherwise.
pub const DEFAULT_DECISION_KEY: &str = "changes_detected";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowDefinition {
    #[serde(default = "default_version")]
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub change_detection: ChangeDetectionConfig,
    pub matrix: MatrixDefinition,
    pub task: TaskDefinition,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChangeDetectionConfig {
    /// Path prefixes or globs that make a change relevant.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_decision_key")]
    pub decision_key: String,
}

fn default_decision_key() -> String {
    DEFAULT_DECISION_KEY.to_string()
}

impl Default for ChangeDetectionConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            decision_key: default_decision_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixDefinition {
    /// Axis name to the ordered list of values it may take.
    pub axes: IndexMap<String, Vec<String>>,
    /// Explicit instance tuples. When empty, the full cross-product of
    /// `axes` is generated instead.
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
    /// Partial tuples; every instance matching one is dropped.
    #[serde(default)]
    pub exclude: Vec<JobParameters>,
    #[serde(default)]
    pub max_parallel: Option<u32>,
}

/// One explicit instance tuple: axis values plus the `always_run` flag.
///
/// Values are read the same way axis values are, so an unquoted `3.10`
/// stays `3.10` instead of passing through a float.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct InstanceSpec {
    #[serde(flatten)]
    pub parameters: JobParameters,
    /// Run regardless of the change decision.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub always_run: bool,
}

impl<'de> Deserialize<'de> for InstanceSpec {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(InstanceSpecVisitor)
    }
}

struct InstanceSpecVisitor;

impl<'de> Visitor<'de> for InstanceSpecVisitor {
    type Value = InstanceSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of axis names to values")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<InstanceSpec, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut spec = InstanceSpec {
            parameters: JobParameters::new(),
            always_run: false,
        };
        while let Some(key) = map.next_key::<String>()? {
            if key == "always_run" {
                spec.always_run = map.next_value()?;
                continue;
            }
            let value: String = map
                .next_value()
                .map_err(|e| {
                    <A::Error as de::Error>::custom(format!("axis '{}': {}", key, e))
                })?;
            if spec.parameters.insert(key.clone(), value).is_some() {
                return Err(de::Error::custom(format!("axis '{}' given twice", key)));
            }
        }
        Ok(spec)
    }
}

impl InstanceSpec {
    pub fn new<K, V>(parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            always_run: false,
        }
    }

    pub fn always_run(mut self) -> Self {
        self.always_run = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskDefinition {
    /// Command executed for every instance; supports `${{ matrix.<axis> }}`.
    pub run: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default = "default_task_timeout")]
    pub timeout_minutes: u32,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_task_timeout() -> u32 {
    30
}

impl WorkflowDefinition {
    /// Parse and validate a workflow from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let definition: WorkflowDefinition = serde_yaml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Read, parse, and validate a workflow file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Structural validation. Instance tuples are checked against the axes
    /// during matrix expansion.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidWorkflow("workflow name is empty".into()));
        }
        if self.task.run.trim().is_empty() {
            return Err(Error::InvalidWorkflow("task command is empty".into()));
        }
        if self.task.timeout_minutes == 0 {
            return Err(Error::InvalidWorkflow(
                "task timeout_minutes must be positive".into(),
            ));
        }
        if self.change_detection.decision_key.trim().is_empty() {
            return Err(Error::InvalidWorkflow("decision_key is empty".into()));
        }
        if self.change_detection.patterns.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidWorkflow("empty path pattern".into()));
        }
        if self.matrix.max_parallel == Some(0) {
            return Err(Error::InvalidMatrix("max_parallel must be positive".into()));
        }
        self.matrix.validate_axes()
    }
}

impl MatrixDefinition {
    pub fn validate_axes(&self) -> Result<()> {
        if self.axes.is_empty() {
            return Err(Error::InvalidMatrix("at least one axis is required".into()));
        }
        for (axis, values) in &self.axes {
            if axis.trim().is_empty() {
                return Err(Error::InvalidMatrix("axis name is empty".into()));
            }
            if values.is_empty() {
                return Err(Error::InvalidMatrix(format!("axis '{}' has no values", axis)));
            }
            let mut seen = HashSet::new();
            for value in values {
                if !seen.insert(value.as_str()) {
                    return Err(Error::InvalidMatrix(format!(
                        "axis '{}' lists value '{}' twice",
                        axis, value
                    )));
                }
            }
        }
        Ok(())
    }
}
