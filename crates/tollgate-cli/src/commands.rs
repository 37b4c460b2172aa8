//! CLI command definitions.

use crate::config::OutputFormat;
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter workflow file
    Init,

    /// Validate a workflow file
    Validate {
        /// Path to workflow file
        #[arg(default_value = "tollgate.yaml")]
        path: PathBuf,
    },

    /// List the job instances a workflow expands to
    Expand {
        /// Path to workflow file
        #[arg(default_value = "tollgate.yaml")]
        path: PathBuf,
    },

    /// Evaluate the change decision without running any job
    Detect {
        /// Path to workflow file
        #[arg(default_value = "tollgate.yaml")]
        path: PathBuf,

        #[command(flatten)]
        changes: ChangeArgs,

        /// Output format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Run a workflow locally
    Run {
        /// Path to workflow file
        #[arg(default_value = "tollgate.yaml")]
        path: PathBuf,

        #[command(flatten)]
        changes: ChangeArgs,

        /// Directory the task commands run in
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Directory holding run-scoped decision stores
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Keep the decision store after the run
        #[arg(long)]
        keep_store: bool,

        /// Maximum number of task bodies running at once
        #[arg(short = 'j', long)]
        max_parallel: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Print the workflow JSON schema
    Schema,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Where the changed paths come from.
#[derive(Args, Debug, Clone)]
pub struct ChangeArgs {
    /// Base revision
    #[arg(long, default_value = "HEAD~1")]
    pub base: String,

    /// Head revision
    #[arg(long, default_value = "HEAD")]
    pub head: String,

    /// Read changed paths from a file (`-` for stdin) instead of git
    #[arg(long)]
    pub changed_from: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
