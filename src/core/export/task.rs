//! Document export tasks
//!
//! One task per discovered document, created when batches are built. A task
//! is terminal once completed, failed, or skipped.

use crate::adapters::traits::{DocumentRef, FolderRef, WrittenFile};
use crate::domain::{Document, ExportFormat, ResolvedFormat};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Whether the task is finished
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

/// Export of one document to one or more formats
#[derive(Debug, Clone, Serialize)]
pub struct DocumentExportTask {
    pub document: Document,
    /// Formats to produce, resolved for the document type
    pub formats: Vec<ResolvedFormat>,
    pub status: TaskStatus,
    pub file_paths: Vec<PathBuf>,
    pub file_sizes: Vec<u64>,
    pub error: Option<String>,
    /// Attempts beyond the first, across all formats
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DocumentExportTask {
    /// Create a pending task exporting `document` to each requested format
    pub fn new(document: Document, requested: &[ExportFormat]) -> Self {
        let formats = resolve_formats(&document, requested);
        Self {
            document,
            formats,
            status: TaskStatus::Pending,
            file_paths: Vec::new(),
            file_sizes: Vec::new(),
            error: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Reference passed to the exporter
    pub fn document_ref(&self) -> DocumentRef {
        DocumentRef::from(&self.document)
    }

    /// Folder the document lives in
    pub fn folder_ref(&self) -> FolderRef {
        FolderRef::for_document(&self.document)
    }

    pub(crate) fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn record_file(&mut self, file: WrittenFile) {
        self.file_paths.push(file.path);
        self.file_sizes.push(file.size);
    }

    pub(crate) fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn skip(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Skipped;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }

    /// Total bytes written
    pub fn bytes_written(&self) -> u64 {
        self.file_sizes.iter().sum()
    }
}

/// Resolve requested formats for a document, dropping duplicates
///
/// With nothing requested the native format is used.
pub fn resolve_formats(document: &Document, requested: &[ExportFormat]) -> Vec<ResolvedFormat> {
    let mut formats = Vec::new();
    for format in requested {
        let resolved = ResolvedFormat::resolve(*format, document.doc_type);
        if !formats.contains(&resolved) {
            formats.push(resolved);
        }
    }
    if formats.is_empty() {
        formats.push(ResolvedFormat::native_for(document.doc_type));
    }
    formats
}

/// Documents per batch for a run of `total` documents
pub fn batch_size_for(total: usize) -> usize {
    match total {
        0..=10 => 2,
        11..=50 => 5,
        51..=200 => 10,
        201..=1000 => 20,
        _ => 50,
    }
}
