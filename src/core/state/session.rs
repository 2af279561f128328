//! Export session model
//!
//! This module defines the session record owned by
//! [`ExportStateManager`](super::ExportStateManager) and the projections
//! (progress, summary) derived from it.

use crate::config::ExportConfig;
use crate::domain::ids::SessionId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum number of error records kept per session
pub const MAX_SESSION_ERRORS: usize = 500;

/// Export status enumeration
///
/// Status machine: `Initializing → Discovering → Exporting ⇄ Paused →
/// Completed | Failed | Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Session created, nothing started yet
    Initializing,
    /// Listing documents
    Discovering,
    /// Exporting documents
    Exporting,
    /// New batches are held back
    Paused,
    /// Export finished
    Completed,
    /// Export failed as a whole
    Failed,
    /// Export cancelled by the operator
    Cancelled,
}

impl Default for ExportStatus {
    fn default() -> Self {
        Self::Initializing
    }
}

impl ExportStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportStatus::Completed | ExportStatus::Failed | ExportStatus::Cancelled
        )
    }

    /// Whether the status machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: ExportStatus) -> bool {
        use ExportStatus::*;

        if *self == next {
            return !self.is_terminal();
        }

        match (self, next) {
            (Initializing, Discovering | Exporting | Failed | Cancelled) => true,
            (Discovering, Exporting | Completed | Failed | Cancelled) => true,
            (Exporting, Paused | Completed | Failed | Cancelled) => true,
            (Paused, Exporting | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExportStatus::Initializing => "initializing",
            ExportStatus::Discovering => "discovering",
            ExportStatus::Exporting => "exporting",
            ExportStatus::Paused => "paused",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
            ExportStatus::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// Per-document failure recorded in the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportError {
    pub document_id: String,
    pub document_title: String,
    pub folder_path: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl ExportError {
    /// Create an error record stamped with the current time
    pub fn new(
        document_id: impl Into<String>,
        document_title: impl Into<String>,
        folder_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_title: document_title.into(),
            folder_path: folder_path.into(),
            message: message.into(),
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    /// Set how many retries preceded the failure
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Mutable state of one export run
///
/// Invariant: `processed_documents == successful_documents + failed_documents`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportState {
    pub session_id: SessionId,
    pub status: ExportStatus,
    pub total_documents: usize,
    pub processed_documents: usize,
    pub successful_documents: usize,
    pub failed_documents: usize,
    pub current_document: Option<String>,
    pub current_folder: Option<String>,
    pub current_operation: Option<String>,
    pub current_format: Option<String>,
    /// Most recent failures, oldest dropped past [`MAX_SESSION_ERRORS`]
    pub errors: Vec<ExportError>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_update_time: DateTime<Utc>,
    pub output_directory: String,
    #[serde(skip)]
    pub(crate) started_at: Instant,
    #[serde(skip)]
    pub(crate) finished_at: Option<Instant>,
}

impl ExportState {
    pub(crate) fn new(session_id: SessionId, output_directory: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            status: ExportStatus::Initializing,
            total_documents: 0,
            processed_documents: 0,
            successful_documents: 0,
            failed_documents: 0,
            current_document: None,
            current_folder: None,
            current_operation: None,
            current_format: None,
            errors: Vec::new(),
            start_time: now,
            end_time: None,
            last_update_time: now,
            output_directory,
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    /// Documents neither completed nor failed
    pub fn remaining_documents(&self) -> usize {
        self.total_documents.saturating_sub(self.processed_documents)
    }

    /// Time since the export started, frozen once it finished
    pub fn elapsed(&self) -> Duration {
        match self.finished_at {
            Some(finished) => finished.duration_since(self.started_at),
            None => self.started_at.elapsed(),
        }
    }

    pub(crate) fn push_error(&mut self, error: ExportError) {
        self.errors.push(error);
        if self.errors.len() > MAX_SESSION_ERRORS {
            let excess = self.errors.len() - MAX_SESSION_ERRORS;
            self.errors.drain(..excess);
        }
    }
}

/// One export run: configuration snapshot plus live state
#[derive(Debug, Clone, Serialize)]
pub struct ExportSession {
    pub id: SessionId,
    pub config: ExportConfig,
    pub state: ExportState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update merged into [`ExportState`]
///
/// `None` leaves a field untouched. The `current_*` fields take
/// `Some(None)` to clear them.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub status: Option<ExportStatus>,
    pub total_documents: Option<usize>,
    pub processed_documents: Option<usize>,
    pub successful_documents: Option<usize>,
    pub failed_documents: Option<usize>,
    pub current_document: Option<Option<String>>,
    pub current_folder: Option<Option<String>>,
    pub current_operation: Option<Option<String>>,
    pub current_format: Option<Option<String>>,
    pub output_directory: Option<String>,
}

impl StateUpdate {
    /// Update that only changes the status
    pub fn status(status: ExportStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Live progress derived from [`ExportState`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Documents processed so far
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
    pub current_document: Option<String>,
    pub current_folder: Option<String>,
    /// Documents per minute
    pub export_speed: f64,
    pub elapsed: Duration,
    pub estimated_time_remaining: Option<Duration>,
}

impl ExportProgress {
    pub(crate) fn from_state(state: &ExportState) -> Self {
        let current = state.processed_documents;
        let total = state.total_documents;
        let percentage = if total == 0 {
            0.0
        } else {
            current as f64 * 100.0 / total as f64
        };

        let elapsed = state.elapsed();
        let minutes = elapsed.as_secs_f64() / 60.0;
        let export_speed = if minutes > 0.0 {
            current as f64 / minutes
        } else {
            0.0
        };

        let estimated_time_remaining = if current > 0 && current <= total {
            let per_document = elapsed.as_secs_f64() / current as f64;
            Some(Duration::from_secs_f64(
                per_document * (total - current) as f64,
            ))
        } else {
            None
        };

        Self {
            current,
            total,
            percentage,
            current_document: state.current_document.clone(),
            current_folder: state.current_folder.clone(),
            export_speed,
            elapsed,
            estimated_time_remaining,
        }
    }
}

/// Per-folder counts for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderSummary {
    pub folder_path: String,
    pub document_count: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Immutable snapshot of a session for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub session_id: SessionId,
    pub status: ExportStatus,
    pub total_documents: usize,
    pub successful_documents: usize,
    pub failed_documents: usize,
    /// `total - processed`
    pub skipped_documents: usize,
    pub output_directory: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub errors: Vec<ExportError>,
    pub folders: Vec<FolderSummary>,
}

impl ExportSummary {
    pub(crate) fn from_state(state: &ExportState, folders: Vec<FolderSummary>) -> Self {
        Self {
            session_id: state.session_id,
            status: state.status,
            total_documents: state.total_documents,
            successful_documents: state.successful_documents,
            failed_documents: state.failed_documents,
            skipped_documents: state.remaining_documents(),
            output_directory: state.output_directory.clone(),
            start_time: state.start_time,
            end_time: state.end_time,
            duration: state.elapsed(),
            errors: state.errors.clone(),
            folders,
        }
    }

    /// Successful share of all documents, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_documents == 0 {
            return 100.0;
        }
        self.successful_documents as f64 * 100.0 / self.total_documents as f64
    }
}

/// Notification published by the state manager
#[derive(Debug, Clone)]
pub enum StateEvent {
    /// A new session replaced any previous one
    SessionCreated(SessionId),
    /// State changed; carries the merged state
    StateChanged(Box<ExportState>),
    /// Progress-relevant fields changed
    Progress(ExportProgress),
    /// The session was cleared
    SessionCleared(SessionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use ExportStatus::*;

        assert!(Initializing.can_transition_to(Discovering));
        assert!(Discovering.can_transition_to(Exporting));
        assert!(Exporting.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Exporting));
        assert!(Exporting.can_transition_to(Completed));
        assert!(Paused.can_transition_to(Cancelled));

        assert!(!Completed.can_transition_to(Exporting));
        assert!(!Cancelled.can_transition_to(Cancelled));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Discovering.can_transition_to(Paused));
    }

    #[test]
    fn test_error_list_is_bounded() {
        let mut state = ExportState::new(SessionId::generate(), "./out".to_string());
        for i in 0..(MAX_SESSION_ERRORS + 3) {
            state.push_error(ExportError::new(format!("d{i}"), "Doc", "/", "failed"));
        }

        assert_eq!(state.errors.len(), MAX_SESSION_ERRORS);
        assert_eq!(state.errors[0].document_id, "d3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_projection() {
        let mut state = ExportState::new(SessionId::generate(), "./out".to_string());
        state.total_documents = 10;
        state.processed_documents = 4;

        tokio::time::advance(Duration::from_secs(120)).await;
        let progress = ExportProgress::from_state(&state);

        assert_eq!(progress.current, 4);
        assert_eq!(progress.percentage, 40.0);
        assert_eq!(progress.export_speed, 2.0);
        assert_eq!(
            progress.estimated_time_remaining,
            Some(Duration::from_secs(180))
        );
    }

    #[test]
    fn test_progress_with_zero_total() {
        let state = ExportState::new(SessionId::generate(), "./out".to_string());
        let progress = ExportProgress::from_state(&state);
        assert_eq!(progress.percentage, 0.0);
        assert!(progress.estimated_time_remaining.is_none());
    }
}
