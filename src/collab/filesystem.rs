//! Filesystem: the narrow write surface EscalationHandler needs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), FilesystemError>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<(), FilesystemError>;
    async fn exists(&self, path: &Path) -> bool;
}

/// Default implementation backed by `tokio::fs`.
pub struct StdFilesystem;

#[async_trait]
impl Filesystem for StdFilesystem {
    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), FilesystemError> {
        if recursive {
            tokio::fs::create_dir_all(path).await?;
        } else {
            tokio::fs::create_dir(path).await?;
        }
        Ok(())
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<(), FilesystemError> {
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

impl StdFilesystem {
    pub fn path_buf(parts: &[&str]) -> PathBuf {
        parts.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_exists() {
        let dir = tempdir().unwrap();
        let fs = StdFilesystem;
        let file = dir.path().join("report.json");
        fs.write_file(&file, "{}").await.unwrap();
        assert!(fs.exists(&file).await);
    }

    #[tokio::test]
    async fn mkdir_recursive_creates_nested_dirs() {
        let dir = tempdir().unwrap();
        let fs = StdFilesystem;
        let nested = dir.path().join("a/b/c");
        fs.mkdir(&nested, true).await.unwrap();
        assert!(fs.exists(&nested).await);
    }
}
