//! CLI configuration management.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// Default workspace for task commands.
    pub workspace: Option<PathBuf>,
    /// Root directory for run-scoped decision stores.
    pub store_dir: Option<PathBuf>,
    /// Default limit on concurrently running task bodies.
    pub max_parallel: Option<usize>,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("dev", "tollgate", "tollgate")
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = Self::project_dirs().ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Configured store root, else the platform data directory.
    pub fn resolved_store_dir(&self) -> PathBuf {
        self.store_dir.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("runs"))
                .unwrap_or_else(|| std::env::temp_dir().join("tollgate-runs"))
        })
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "workspace" => self.workspace = Some(PathBuf::from(value)),
            "store_dir" => self.store_dir = Some(PathBuf::from(value)),
            "max_parallel" => {
                let n: usize = value
                    .parse()
                    .map_err(|_| format!("Invalid max_parallel: {}", value))?;
                if n == 0 {
                    return Err("max_parallel must be positive".to_string());
                }
                self.max_parallel = Some(n);
            }
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    _ => return Err(format!("Invalid output format: {}", value)),
                };
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}
