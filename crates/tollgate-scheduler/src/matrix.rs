//! Matrix expansion into job instances.

use crate::dag::{GatePolicy, JobGraph};
use std::collections::HashSet;
use tollgate_core::ids::JobId;
use tollgate_core::workflow::{InstanceSpec, JobParameters, MatrixDefinition};
use tollgate_core::{Error, Result};
use tracing::debug;

/// A single job in an expanded matrix.
#[derive(Debug, Clone)]
pub struct JobInstance {
    pub id: JobId,
    pub index: usize,
    pub parameters: JobParameters,
    pub display_name: String,
    pub always_run: bool,
}

/// Result of matrix expansion.
#[derive(Debug, Clone)]
pub struct MatrixExpansion {
    pub workflow_name: String,
    pub jobs: Vec<JobInstance>,
    pub max_parallel: Option<u32>,
}

impl MatrixExpansion {
    pub fn always_run_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.always_run).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Expander for matrix configurations.
pub struct MatrixExpander;

impl MatrixExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand a matrix into one job instance per parameter tuple.
    ///
    /// Explicit `instances` are used as given (validated and put in axis
    /// order); without them the full cross-product of the axes is generated.
    /// `exclude` entries remove every tuple they match.
    pub fn expand(&self, workflow_name: &str, matrix: &MatrixDefinition) -> Result<MatrixExpansion> {
        matrix.validate_axes()?;
        for exclude in &matrix.exclude {
            self.check_known_axes(matrix, exclude)?;
        }

        let specs = if matrix.instances.is_empty() {
            self.generate_combinations(matrix)
        } else {
            matrix
                .instances
                .iter()
                .map(|spec| self.normalize(matrix, spec))
                .collect::<Result<Vec<_>>>()?
        };

        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for spec in specs {
            if matrix
                .exclude
                .iter()
                .any(|exclude| self.matches_exclude(&spec.parameters, exclude))
            {
                continue;
            }

            let display_name = self.format_display_name(workflow_name, &spec.parameters);
            let key: Vec<String> = spec.parameters.values().cloned().collect();
            if !seen.insert(key) {
                return Err(Error::DuplicateInstance(display_name));
            }

            jobs.push(JobInstance {
                id: JobId::default(),
                index: jobs.len(),
                parameters: spec.parameters,
                display_name,
                always_run: spec.always_run,
            });
        }

        if jobs.is_empty() {
            return Err(Error::InvalidMatrix("matrix expands to zero jobs".into()));
        }

        debug!(workflow = workflow_name, jobs = jobs.len(), "Matrix expanded");

        Ok(MatrixExpansion {
            workflow_name: workflow_name.to_string(),
            jobs,
            max_parallel: matrix.max_parallel,
        })
    }

    /// Wire every instance into a job graph under the given gate policy.
    pub fn wire(&self, expansion: &MatrixExpansion, policy: GatePolicy) -> Result<JobGraph> {
        JobGraph::build(expansion, policy)
    }

    fn normalize(&self, matrix: &MatrixDefinition, spec: &InstanceSpec) -> Result<InstanceSpec> {
        self.check_known_axes(matrix, &spec.parameters)?;

        let mut parameters = JobParameters::new();
        for (axis, allowed) in &matrix.axes {
            let value = spec.parameters.get(axis).ok_or_else(|| {
                Error::InvalidMatrix(format!(
                    "instance {:?} has no value for axis '{}'",
                    spec.parameters, axis
                ))
            })?;
            if !allowed.contains(value) {
                return Err(Error::InvalidMatrix(format!(
                    "value '{}' is not declared for axis '{}'",
                    value, axis
                )));
            }
            parameters.insert(axis.clone(), value.clone());
        }

        Ok(InstanceSpec {
            parameters,
            always_run: spec.always_run,
        })
    }

    fn check_known_axes(&self, matrix: &MatrixDefinition, tuple: &JobParameters) -> Result<()> {
        match tuple.keys().find(|k| !matrix.axes.contains_key(*k)) {
            Some(unknown) => Err(Error::InvalidMatrix(format!("unknown axis '{}'", unknown))),
            None => Ok(()),
        }
    }

    fn generate_combinations(&self, matrix: &MatrixDefinition) -> Vec<InstanceSpec> {
        let mut result = vec![JobParameters::new()];

        for (axis, values) in &matrix.axes {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for combo in &result {
                for value in values {
                    let mut combo = combo.clone();
                    combo.insert(axis.clone(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }

        result
            .into_iter()
            .map(|parameters| InstanceSpec {
                parameters,
                always_run: false,
            })
            .collect()
    }

    fn matches_exclude(&self, combo: &JobParameters, exclude: &JobParameters) -> bool {
        !exclude.is_empty()
            && exclude
                .iter()
                .all(|(key, value)| combo.get(key) == Some(value))
    }

    fn format_display_name(&self, workflow_name: &str, vars: &JobParameters) -> String {
        let parts: Vec<String> = vars.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{} ({})", workflow_name, parts.join(", "))
    }
}

impl Default for MatrixExpander {
    fn default() -> Self {
        Self::new()
    }
}
