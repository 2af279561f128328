//! Writes exported documents to the local filesystem

use crate::adapters::traits::{FileWriter, WriteRequest, WrittenFile};
use crate::config::CONFLICT_RESOLUTION_MODES;
use crate::domain::{sanitize_file_name, QuipError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;

// numbered variants tried before giving up
const MAX_NUMBERED_VARIANTS: u32 = 1000;

/// What to do when the target file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// Append ` (1)`, ` (2)`, ... to the file name
    #[default]
    Number,
    Overwrite,
    /// Keep the existing file
    Skip,
}

impl FromStr for ConflictResolution {
    type Err = QuipError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "number" => Ok(Self::Number),
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            other => Err(QuipError::Configuration(format!(
                "Invalid conflict resolution '{}'. Must be one of: {}",
                other,
                CONFLICT_RESOLUTION_MODES.join(", ")
            ))),
        }
    }
}

/// File writer for local directories
#[derive(Debug, Clone)]
pub struct LocalFileWriter {
    conflict_resolution: ConflictResolution,
    sanitize_names: bool,
}

impl LocalFileWriter {
    /// Create a writer
    pub fn new(conflict_resolution: ConflictResolution, sanitize_names: bool) -> Self {
        Self {
            conflict_resolution,
            sanitize_names,
        }
    }

    fn base_name(&self, request: &WriteRequest) -> String {
        if self.sanitize_names {
            sanitize_file_name(&request.file_name)
        } else {
            request.file_name.replace(['/', '\\'], "_")
        }
    }

    /// Claim a path for `request` and write to it
    ///
    /// Candidates are created with `create_new`, so two writers racing for
    /// the same name never both win it. Returns the path and whether the
    /// write was skipped.
    async fn write_resolved(&self, dir: &Path, request: &WriteRequest) -> Result<(PathBuf, bool)> {
        let name = self.base_name(request);
        let extension = request.format.extension();
        let candidate = dir.join(format!("{name}.{extension}"));

        match self.conflict_resolution {
            ConflictResolution::Overwrite => {
                tokio::fs::write(&candidate, &request.content)
                    .await
                    .map_err(|e| write_error(&candidate, &e))?;
                Ok((candidate, false))
            }
            ConflictResolution::Skip => {
                let created = create_new(&candidate, &request.content).await?;
                Ok((candidate, !created))
            }
            ConflictResolution::Number => {
                if create_new(&candidate, &request.content).await? {
                    return Ok((candidate, false));
                }
                for n in 1..=MAX_NUMBERED_VARIANTS {
                    let numbered = dir.join(format!("{name} ({n}).{extension}"));
                    if create_new(&numbered, &request.content).await? {
                        return Ok((numbered, false));
                    }
                }
                Err(QuipError::Io(format!(
                    "File exists: no free name for {} in {}",
                    name,
                    dir.display()
                )))
            }
        }
    }
}

impl Default for LocalFileWriter {
    fn default() -> Self {
        Self::new(ConflictResolution::default(), true)
    }
}

/// Create `path` and write `content`; false if the file already exists
async fn create_new(path: &Path, content: &[u8]) -> Result<bool> {
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(write_error(path, &e)),
    };

    file.write_all(content).await.map_err(|e| write_error(path, &e))?;
    file.flush().await.map_err(|e| write_error(path, &e))?;
    Ok(true)
}

fn write_error(path: &Path, e: &std::io::Error) -> QuipError {
    QuipError::Io(format!("Failed to write {}: {} ({:?})", path.display(), e, e.kind()))
}

#[async_trait]
impl FileWriter for LocalFileWriter {
    async fn write_document(&self, target_dir: &Path, request: &WriteRequest) -> Result<WrittenFile> {
        tokio::fs::create_dir_all(target_dir).await?;

        let (path, skipped) = self.write_resolved(target_dir, request).await?;
        if skipped {
            let size = tokio::fs::metadata(&path).await?.len();
            tracing::debug!(path = %path.display(), "File exists, skipping write");
            return Ok(WrittenFile {
                path,
                size,
                skipped: true,
            });
        }

        tracing::debug!(
            path = %path.display(),
            bytes = request.content.len(),
            "Wrote document"
        );

        Ok(WrittenFile {
            path,
            size: request.content.len() as u64,
            skipped: false,
        })
    }
}
