//! Export result and reporting
//!
//! This module defines the final result returned by an export run.

use crate::core::state::{ExportError, ExportStatus, ExportSummary};
use crate::domain::SessionId;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Final result of an export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    /// True when the run completed without failed documents
    pub success: bool,

    /// Session that produced the result
    pub session_id: SessionId,

    /// Final session status
    pub status: ExportStatus,

    /// Documents discovered
    pub total_documents: usize,

    /// Documents exported
    pub successful_documents: usize,

    /// Documents that failed
    pub failed_documents: usize,

    /// Documents never attempted (cancelled or aborted)
    pub skipped_documents: usize,

    /// Per-document failures
    pub errors: Vec<ExportError>,

    /// Export root
    pub output_directory: PathBuf,

    /// Files written
    pub exported_files: Vec<PathBuf>,

    /// Bytes written
    pub total_bytes: u64,

    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl ExportResult {
    /// Build a result from a session summary
    pub fn from_summary(summary: &ExportSummary, duration: Duration) -> Self {
        Self {
            success: summary.status == ExportStatus::Completed && summary.failed_documents == 0,
            session_id: summary.session_id,
            status: summary.status,
            total_documents: summary.total_documents,
            successful_documents: summary.successful_documents,
            failed_documents: summary.failed_documents,
            skipped_documents: summary.skipped_documents,
            errors: summary.errors.clone(),
            output_directory: PathBuf::from(&summary.output_directory),
            exported_files: Vec::new(),
            total_bytes: 0,
            duration,
        }
    }

    /// Attach the files written during the run
    pub fn with_files(mut self, files: Vec<PathBuf>, total_bytes: u64) -> Self {
        self.exported_files = files;
        self.total_bytes = total_bytes;
        self
    }

    /// Get success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_documents == 0 {
            return 100.0;
        }
        (self.successful_documents as f64 / self.total_documents as f64) * 100.0
    }

    /// Log the result
    pub fn log_summary(&self) {
        tracing::info!(
            session_id = %self.session_id,
            status = %self.status,
            total = self.total_documents,
            successful = self.successful_documents,
            failed = self.failed_documents,
            skipped = self.skipped_documents,
            bytes = self.total_bytes,
            duration_secs = self.duration.as_secs(),
            success_rate = format!("{:.2}%", self.success_rate()),
            "Export finished"
        );

        if !self.errors.is_empty() {
            tracing::warn!(
                error_count = self.errors.len(),
                "Export completed with errors"
            );
            for error in &self.errors {
                tracing::warn!(
                    document_id = %error.document_id,
                    title = %error.document_title,
                    message = %error.message,
                    "Export error"
                );
            }
        }
    }
}
