//! Base output directory setup

use crate::adapters::traits::DirectoryManager;
use crate::domain::{QuipError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Creates the export root on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalDirectoryManager {
    base: PathBuf,
}

impl LocalDirectoryManager {
    /// Manager for `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl DirectoryManager for LocalDirectoryManager {
    async fn initialize_base_directory(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.base).await.map_err(|e| {
            QuipError::Io(format!(
                "Failed to create output directory {}: {}",
                self.base.display(),
                e
            ))
        })?;

        let metadata = tokio::fs::metadata(&self.base).await?;
        if metadata.permissions().readonly() {
            return Err(QuipError::Io(format!(
                "Output directory {} is not writable (permission denied)",
                self.base.display()
            )));
        }

        tracing::debug!(path = %self.base.display(), "Output directory ready");
        Ok(self.base.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_nested_directory() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("exports").join("2026");

        let manager = LocalDirectoryManager::new(&base);
        let path = manager.initialize_base_directory().await.unwrap();

        assert_eq!(path, base);
        assert!(base.is_dir());
    }

    #[tokio::test]
    async fn test_existing_directory_is_accepted() {
        let temp = TempDir::new().unwrap();
        let manager = LocalDirectoryManager::new(temp.path());
        assert!(manager.initialize_base_directory().await.is_ok());
        assert!(manager.initialize_base_directory().await.is_ok());
    }
}
