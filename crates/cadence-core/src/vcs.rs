use std::path::{Path, PathBuf};

use cadence_types::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Advisory VCS integration. Detected by the working-tree marker; a
/// deployment without one must not break checkpoints, so every caller
/// treats `None`/errors as "no data".
pub struct Vcs {
    root: PathBuf,
}

impl Vcs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn is_repository(&self) -> bool {
        self.root.join(".git").exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| Error::ExternalTool {
                message: format!("failed to spawn git {}", args.first().unwrap_or(&"")),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::ExternalTool {
                message: format!("git {} failed", args.first().unwrap_or(&"")),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Paths with uncommitted changes (`git status --porcelain`), or None
    /// when this is not a repository.
    pub async fn uncommitted_files(&self) -> Result<Option<Vec<String>>> {
        if !self.is_repository() {
            return Ok(None);
        }

        let stdout = self.run(&["status", "--porcelain"]).await?;
        let files = stdout
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| line[3..].trim().to_string())
            .collect();

        Ok(Some(files))
    }

    /// Stage everything and commit; returns the new commit hash.
    pub async fn commit_all(&self, message: &str) -> Result<String> {
        if !self.is_repository() {
            return Err(Error::ExternalTool {
                message: "not a git repository".into(),
                stderr: format!("no .git under {}", self.root.display()),
            });
        }

        self.run(&["add", "-A"]).await?;
        self.run(&["commit", "-m", message]).await?;
        let hash = self.run(&["rev-parse", "HEAD"]).await?;
        let hash = hash.trim().to_string();
        debug!(commit = %hash, "created checkpoint commit");

        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_repository_reports_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = Vcs::new(dir.path());
        assert!(!vcs.is_repository());
        assert_eq!(vcs.uncommitted_files().await.unwrap(), None);
    }

    #[tokio::test]
    async fn commit_outside_repository_is_an_external_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = Vcs::new(dir.path());
        let err = vcs.commit_all("checkpoint").await.unwrap_err();
        assert_eq!(err.code(), "external_tool_error");
    }
}
