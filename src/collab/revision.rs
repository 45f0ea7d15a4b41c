//! RevisionSystem: the version-control adapter consumed by DiffContextBuilder
//! and IterationCommitHandler.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("no changes to commit")]
    NoChanges,
    #[error("unknown revision: {0}")]
    UnknownRevision(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Version-control operations expressed in terms of a generic command
/// runner plus two convenience queries. Diff/commit/tag/reset are built
/// on top of `run`, `head` and `dirty` rather than getting dedicated
/// trait methods.
#[async_trait]
pub trait RevisionSystem: Send + Sync {
    async fn run(&self, args: &[&str]) -> Result<String, RevisionError>;
    async fn head(&self) -> Result<String, RevisionError>;
    async fn dirty(&self) -> Result<bool, RevisionError>;
}

/// Shells out to `git` inside a working copy directory.
pub struct ShellGitRevisionSystem {
    work_dir: PathBuf,
}

impl ShellGitRevisionSystem {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[async_trait]
impl RevisionSystem for ShellGitRevisionSystem {
    async fn run(&self, args: &[&str]) -> Result<String, RevisionError> {
        debug!(?args, "ShellGitRevisionSystem::run: called");
        let output = Command::new("git")
            .args(args)
            .current_dir(self.work_dir())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!(?args, %stderr, "ShellGitRevisionSystem::run: git command failed");
            return Err(RevisionError::CommandFailed(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn head(&self) -> Result<String, RevisionError> {
        self.run(&["rev-parse", "HEAD"]).await
    }

    async fn dirty(&self) -> Result<bool, RevisionError> {
        let status = self.run(&["status", "--porcelain"]).await?;
        Ok(!status.is_empty())
    }
}
