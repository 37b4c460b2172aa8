//! Host-side collaborators for Tollgate runs: task execution in a shell and
//! changed-path discovery.

pub mod diff;
pub mod git;
pub mod runner;
pub mod shell;

pub use diff::StaticDiffProvider;
pub use git::GitDiffProvider;
pub use runner::{OutputLine, OutputStream, RunnerConfig};
pub use shell::ShellTaskExecutor;
