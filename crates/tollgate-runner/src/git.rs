//! Changed paths from a local git checkout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tollgate_core::ports::DiffProvider;
use tollgate_core::run::RevisionPair;
use tollgate_core::{Error, Result};
use tracing::debug;

/// Diffs two revisions with the `git` binary.
#[derive(Debug, Clone)]
pub struct GitDiffProvider {
    repo: PathBuf,
}

impl GitDiffProvider {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Diff(format!("failed to run git: {}", e)))
    }

    /// Resolve a revision to a commit id.
    async fn resolve(&self, revision: &str) -> Result<String> {
        if is_null_revision(revision) {
            return Err(Error::RevisionResolution {
                revision: revision.to_string(),
                reason: "no parent revision".into(),
            });
        }

        let spec = format!("{}^{{commit}}", revision);
        let output = self.git(&["rev-parse", "--verify", "--quiet", &spec]).await?;
        if !output.status.success() {
            return Err(Error::RevisionResolution {
                revision: revision.to_string(),
                reason: "unknown revision".into(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl DiffProvider for GitDiffProvider {
    async fn changed_paths(&self, revisions: &RevisionPair) -> Result<Vec<String>> {
        let base = self.resolve(&revisions.base).await?;
        let head = self.resolve(&revisions.head).await?;

        let output = self
            .git(&["diff", "--name-only", "-z", "--no-renames", &base, &head])
            .await?;
        if !output.status.success() {
            return Err(Error::Diff(format!(
                "git diff exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let paths = parse_name_only(&String::from_utf8_lossy(&output.stdout));
        debug!(base = %base, head = %head, changed = paths.len(), "git diff");
        Ok(paths)
    }
}

/// Empty or all-zero revisions, as sent for a branch's first push.
pub fn is_null_revision(revision: &str) -> bool {
    let revision = revision.trim();
    revision.is_empty() || revision.chars().all(|c| c == '0')
}

/// Split `--name-only -z` output. Paths are NUL-terminated and never quoted.
fn parse_name_only(stdout: &str) -> Vec<String> {
    stdout
        .split('\0')
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    #[test]
    fn test_null_revisions() {
        assert!(is_null_revision("0000000000000000000000000000000000000000"));
        assert!(is_null_revision(""));
        assert!(!is_null_revision("HEAD~1"));
        assert!(!is_null_revision("a1b2c3"));
    }

    #[test]
    fn test_parse_name_only() {
        let paths = parse_name_only("src/lib.rs\0docs/my notes.md\0src/caf\u{e9}.py\0");
        assert_eq!(paths, ["src/lib.rs", "docs/my notes.md", "src/caf\u{e9}.py"]);
    }

    #[tokio::test]
    async fn test_null_base_is_resolution_error() {
        let provider = GitDiffProvider::new(std::env::temp_dir());
        let err = provider
            .changed_paths(&RevisionPair::new("0".repeat(40), "HEAD"))
            .await
            .unwrap_err();
        assert!(err.is_revision_resolution());
    }

    fn git(dir: &Path, args: &[&str]) -> bool {
        StdCommand::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_diff_between_commits() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        if !git(root, &["init", "-q"]) {
            // git not available
            return;
        }
        let identity = ["-c", "user.name=test", "-c", "user.email=test@example.com"];

        std::fs::write(root.join("README.md"), "readme").unwrap();
        assert!(git(root, &["add", "."]));
        assert!(git(root, &[&identity[..], &["commit", "-q", "-m", "one"][..]].concat()));

        std::fs::create_dir(root.join("src")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "// lib").unwrap();
        assert!(git(root, &["add", "."]));
        assert!(git(root, &[&identity[..], &["commit", "-q", "-m", "two"][..]].concat()));

        let provider = GitDiffProvider::new(root);
        let paths = provider
            .changed_paths(&RevisionPair::new("HEAD~1", "HEAD"))
            .await
            .unwrap();
        assert_eq!(paths, ["src/lib.rs"]);

        // the first commit has no parent
        let err = provider
            .changed_paths(&RevisionPair::new("HEAD~2", "HEAD"))
            .await
            .unwrap_err();
        assert!(err.is_revision_resolution());
    }

    #[tokio::test]
    async fn test_non_ascii_path_is_not_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        if !git(root, &["init", "-q"]) {
            // git not available
            return;
        }
        let identity = ["-c", "user.name=test", "-c", "user.email=test@example.com"];

        std::fs::write(root.join("README.md"), "readme").unwrap();
        assert!(git(root, &["add", "."]));
        assert!(git(root, &[&identity[..], &["commit", "-q", "-m", "one"][..]].concat()));

        std::fs::create_dir(root.join("src")).unwrap();
        std::fs::write(root.join("src/caf\u{e9}.py"), "print()").unwrap();
        assert!(git(root, &["add", "."]));
        assert!(git(root, &[&identity[..], &["commit", "-q", "-m", "two"][..]].concat()));

        let paths = GitDiffProvider::new(root)
            .changed_paths(&RevisionPair::new("HEAD~1", "HEAD"))
            .await
            .unwrap();
        assert_eq!(paths, ["src/caf\u{e9}.py"]);
        assert!(paths[0].starts_with("src/"));
    }
}
