//! `${{ ... }}` interpolation for task commands.

use crate::workflow::JobParameters;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{\s*([^}]+?)\s*\}\}").expect("valid interpolation regex"));

/// Context for variable interpolation.
#[derive(Debug, Clone, Default)]
pub struct InterpolationContext {
    /// Workflow and task variables
    pub variables: HashMap<String, String>,
    /// Matrix values for the current job
    pub matrix: JobParameters,
}

impl InterpolationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matrix(mut self, matrix: JobParameters) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Interpolate expressions in a string.
    ///
    /// Supports:
    /// - `${{ variable }}` - workflow or task variable
    /// - `${{ env.VAR }}` - variable, falling back to the process environment
    /// - `${{ matrix.key }}` - matrix value of the current job
    ///
    /// Unknown expressions resolve to the empty string.
    pub fn interpolate(&self, input: &str) -> String {
        EXPRESSION
            .replace_all(input, |caps: &regex::Captures| {
                let expr = caps.get(1).map_or("", |m| m.as_str()).trim();
                self.resolve_expression(expr)
            })
            .to_string()
    }

    fn resolve_expression(&self, expr: &str) -> String {
        if let Some(var_name) = expr.strip_prefix("env.") {
            return self
                .variables
                .get(var_name)
                .cloned()
                .or_else(|| std::env::var(var_name).ok())
                .unwrap_or_default();
        }

        if let Some(key) = expr.strip_prefix("matrix.") {
            return self.matrix.get(key).cloned().unwrap_or_default();
        }

        self.variables.get(expr).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_interpolation() {
        let mut matrix = JobParameters::new();
        matrix.insert("runtime_version".into(), "3.11".into());
        matrix.insert("task_type".into(), "dask".into());
        let ctx = InterpolationContext::new().with_matrix(matrix);
        assert_eq!(
            ctx.interpolate("make ${{ matrix.task_type }} PY=${{matrix.runtime_version}}"),
            "make dask PY=3.11"
        );
    }

    #[test]
    fn test_variable_and_env_lookup() {
        let ctx = InterpolationContext::new()
            .with_variables(HashMap::from([("TARGET".to_string(), "lint".to_string())]));
        assert_eq!(ctx.interpolate("${{ TARGET }}-${{ env.TARGET }}"), "lint-lint");
    }

    #[test]
    fn test_unknown_expression_is_empty() {
        let ctx = InterpolationContext::new();
        assert_eq!(ctx.interpolate("a${{ matrix.missing }}b"), "ab");
    }
}
