//! Branch/commit lookup through the `git` command line.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::models::VcsSnapshot;
use crate::domain::ports::VcsProvider;

/// [`VcsProvider`] that asks `git` about a checkout.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    async fn rev_parse(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = Command::new("git")
            .arg("rev-parse")
            .args(args)
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .context("Failed to run git")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git rev-parse {} failed: {}", args.join(" "), stderr.trim());
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            bail!("git rev-parse {} printed nothing", args.join(" "));
        }
        Ok(value)
    }
}

#[async_trait]
impl VcsProvider for GitCli {
    async fn snapshot(&self) -> VcsSnapshot {
        let unknown = VcsSnapshot::unknown();
        let branch = self
            .rev_parse(&["--abbrev-ref", "HEAD"])
            .await
            .unwrap_or_else(|e| {
                debug!(error = %e, "branch lookup failed");
                unknown.branch.clone()
            });
        let commit = self
            .rev_parse(&["--short", "HEAD"])
            .await
            .unwrap_or_else(|e| {
                debug!(error = %e, "commit lookup failed");
                unknown.commit.clone()
            });
        VcsSnapshot::new(branch, commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_outside_a_repository_is_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = GitCli::new(temp_dir.path()).snapshot().await;
        assert_eq!(snapshot, VcsSnapshot::unknown());
    }

    #[tokio::test]
    async fn test_missing_directory_is_unknown() {
        let snapshot = GitCli::new("/nonexistent/kernel/tree").snapshot().await;
        assert_eq!(snapshot, VcsSnapshot::unknown());
    }
}
