//! Remote folder to local directory mapping

use crate::adapters::traits::{FolderKind, FolderMapper, FolderRef, MappedFolder};
use crate::domain::{sanitize_file_name, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Directory that receives documents shared with the user
pub const SHARED_FOLDER_NAME: &str = "Shared";

/// Maps remote folders below a local base directory
///
/// With `preserve_structure` off, every document lands in the base
/// directory. Shared folders are placed under [`SHARED_FOLDER_NAME`].
#[derive(Debug, Clone)]
pub struct LocalFolderMapper {
    base: PathBuf,
    preserve_structure: bool,
    sanitize_names: bool,
}

impl LocalFolderMapper {
    /// Create a mapper rooted at `base`
    pub fn new(base: impl Into<PathBuf>, preserve_structure: bool, sanitize_names: bool) -> Self {
        Self {
            base: base.into(),
            preserve_structure,
            sanitize_names,
        }
    }

    /// Local path for `folder` without touching the filesystem
    pub fn resolve(&self, folder: &FolderRef) -> PathBuf {
        let mut path = self.base.clone();
        if !self.preserve_structure {
            return path;
        }

        if folder.kind == FolderKind::Shared {
            path.push(SHARED_FOLDER_NAME);
        }
        for segment in &folder.full_path {
            path.push(self.segment_name(segment));
        }
        path
    }

    fn segment_name(&self, segment: &str) -> String {
        if self.sanitize_names {
            return sanitize_file_name(segment);
        }
        // separators and parent references would escape the base directory
        match segment {
            "" | "." | ".." => "_".to_string(),
            other => other.replace(['/', '\\'], "_"),
        }
    }
}

#[async_trait]
impl FolderMapper for LocalFolderMapper {
    async fn map_folder(&self, folder: &FolderRef) -> Result<MappedFolder> {
        let local_path = self.resolve(folder);
        let created = !tokio::fs::try_exists(&local_path).await.unwrap_or(false);
        if created {
            tokio::fs::create_dir_all(&local_path).await?;
            tracing::debug!(path = %local_path.display(), "Created folder");
        }
        Ok(MappedFolder {
            local_path,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn folder(path: &[&str], kind: FolderKind) -> FolderRef {
        FolderRef {
            id: None,
            name: path.last().map(|s| s.to_string()).unwrap_or_default(),
            kind,
            full_path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_resolve_preserves_structure() {
        let mapper = LocalFolderMapper::new("/out", true, true);
        assert_eq!(
            mapper.resolve(&folder(&["Team", "Q3: Plans"], FolderKind::Private)),
            PathBuf::from("/out/Team/Q3_ Plans")
        );
        assert_eq!(
            mapper.resolve(&folder(&["Design"], FolderKind::Shared)),
            PathBuf::from("/out/Shared/Design")
        );
    }

    #[test]
    fn test_resolve_flat() {
        let mapper = LocalFolderMapper::new("/out", false, true);
        assert_eq!(
            mapper.resolve(&folder(&["Team"], FolderKind::Shared)),
            PathBuf::from("/out")
        );
    }

    #[test]
    fn test_unsanitized_segments_cannot_escape() {
        let mapper = LocalFolderMapper::new("/out", true, false);
        assert_eq!(
            mapper.resolve(&folder(&["..", "a/b"], FolderKind::Private)),
            PathBuf::from("/out/_/a_b")
        );
    }

    #[tokio::test]
    async fn test_map_folder_creates_once() {
        let temp = TempDir::new().unwrap();
        let mapper = LocalFolderMapper::new(temp.path(), true, true);
        let eng = folder(&["Eng"], FolderKind::Private);

        let first = mapper.map_folder(&eng).await.unwrap();
        assert!(first.created);
        assert!(first.local_path.is_dir());

        let second = mapper.map_folder(&eng).await.unwrap();
        assert!(!second.created);
    }
}
