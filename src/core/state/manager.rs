//! Export state manager
//!
//! Owns the active export session and publishes state and progress events.
//! The manager is shared as an `Arc<ExportStateManager>` handle; there is no
//! process-wide session.

use super::session::{
    ExportError, ExportProgress, ExportSession, ExportState, ExportStatus, ExportSummary,
    FolderSummary, StateEvent, StateUpdate,
};
use crate::config::ExportConfig;
use crate::domain::ids::SessionId;
use crate::domain::{QuipError, Result};
use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::time::Instant;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State manager for the active export session
///
/// Holds at most one session. Every mutation goes through
/// [`update_state`](Self::update_state), which stamps the update time and
/// publishes [`StateEvent`]s to subscribers.
pub struct ExportStateManager {
    session: Mutex<Option<ExportSession>>,
    events: broadcast::Sender<StateEvent>,
}

impl ExportStateManager {
    /// Create a manager with no active session
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session: Mutex::new(None),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ExportSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: StateEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Subscribe to state and progress events
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Start a fresh session, replacing any current one
    ///
    /// # Arguments
    ///
    /// * `config` - Export options, snapshotted into the session
    pub fn create_session(&self, config: ExportConfig) -> SessionId {
        let id = SessionId::generate();
        let now = Utc::now();
        let session = ExportSession {
            id,
            state: ExportState::new(id, config.output_directory.clone()),
            config,
            created_at: now,
            updated_at: now,
        };

        let previous = self.lock().replace(session);
        if let Some(previous) = previous {
            tracing::debug!(previous_session = %previous.id, "Replacing export session");
        }

        tracing::info!(session_id = %id, "Export session created");
        self.publish(StateEvent::SessionCreated(id));
        id
    }

    /// Drop the active session, if any
    pub fn clear_session(&self) {
        if let Some(session) = self.lock().take() {
            tracing::debug!(session_id = %session.id, "Export session cleared");
            self.publish(StateEvent::SessionCleared(session.id));
        }
    }

    /// Copy of the active session
    pub fn get_session(&self) -> Option<ExportSession> {
        self.lock().clone()
    }

    /// Copy of the active session's state
    pub fn get_state(&self) -> Option<ExportState> {
        self.lock().as_ref().map(|s| s.state.clone())
    }

    /// Merge `update` into the active session's state
    ///
    /// Publishes [`StateEvent::StateChanged`], and [`StateEvent::Progress`]
    /// when processed/total counts or the current document/folder changed.
    ///
    /// # Errors
    ///
    /// Returns [`QuipError::State`] if there is no active session or the
    /// update requests an illegal status transition.
    pub fn update_state(&self, update: StateUpdate) -> Result<ExportState> {
        self.mutate(|state| {
            apply_update(state, update)?;
            Ok(())
        })
    }

    fn mutate<F>(&self, f: F) -> Result<ExportState>
    where
        F: FnOnce(&mut ExportState) -> Result<()>,
    {
        let (state, progress_changed) = {
            let mut guard = self.lock();
            let session = guard
                .as_mut()
                .ok_or_else(|| QuipError::State("No active export session".to_string()))?;

            let before = ProgressKey::of(&session.state);
            f(&mut session.state)?;

            let now = Utc::now();
            session.state.last_update_time = now;
            session.updated_at = now;

            let changed = ProgressKey::of(&session.state) != before;
            (session.state.clone(), changed)
        };

        if progress_changed {
            self.publish(StateEvent::Progress(ExportProgress::from_state(&state)));
        }
        self.publish(StateEvent::StateChanged(Box::new(state.clone())));
        Ok(state)
    }

    /// Move to `status`
    ///
    /// # Errors
    ///
    /// Returns [`QuipError::State`] for illegal transitions.
    pub fn set_status(&self, status: ExportStatus) -> Result<ExportState> {
        self.update_state(StateUpdate::status(status))
    }

    /// Enter the discovery phase
    pub fn set_discovering(&self) -> Result<ExportState> {
        self.update_state(StateUpdate {
            status: Some(ExportStatus::Discovering),
            current_operation: Some(Some("discovering".to_string())),
            ..Default::default()
        })
    }

    /// Record the number of documents to export and reset counters
    pub fn initialize_export(&self, total_documents: usize) -> Result<ExportState> {
        self.update_state(StateUpdate {
            total_documents: Some(total_documents),
            processed_documents: Some(0),
            successful_documents: Some(0),
            failed_documents: Some(0),
            ..Default::default()
        })
    }

    /// Enter the exporting phase and restart the clock
    pub fn start_export(&self) -> Result<ExportState> {
        self.mutate(|state| {
            transition(state, ExportStatus::Exporting)?;
            state.start_time = Utc::now();
            state.started_at = Instant::now();
            state.current_operation = Some("exporting".to_string());
            Ok(())
        })
    }

    /// Mark `title` as the document being exported
    pub fn start_document_export(
        &self,
        title: &str,
        folder: &str,
        format: Option<&str>,
    ) -> Result<ExportState> {
        self.update_state(StateUpdate {
            current_document: Some(Some(title.to_string())),
            current_folder: Some(Some(folder.to_string())),
            current_operation: Some(Some("exporting document".to_string())),
            current_format: Some(format.map(str::to_string)),
            ..Default::default()
        })
    }

    /// Count a document as successfully exported
    pub fn complete_document_export(&self) -> Result<ExportState> {
        self.mutate(|state| {
            state.processed_documents += 1;
            state.successful_documents += 1;
            Ok(())
        })
    }

    /// Count a document as failed and record the error
    pub fn fail_document_export(&self, error: ExportError) -> Result<ExportState> {
        self.mutate(|state| {
            state.processed_documents += 1;
            state.failed_documents += 1;
            state.push_error(error);
            Ok(())
        })
    }

    /// Finish the export successfully
    pub fn complete_export(&self) -> Result<ExportState> {
        self.finish(ExportStatus::Completed)
    }

    /// Finish the export as failed
    pub fn fail_export(&self, message: &str) -> Result<ExportState> {
        tracing::error!(error = %message, "Export failed");
        self.finish(ExportStatus::Failed)
    }

    /// Finish the export as cancelled
    pub fn cancel_export(&self) -> Result<ExportState> {
        self.finish(ExportStatus::Cancelled)
    }

    /// Hold back new batches
    pub fn pause_export(&self) -> Result<ExportState> {
        self.set_status(ExportStatus::Paused)
    }

    /// Resume after a pause
    pub fn resume_export(&self) -> Result<ExportState> {
        self.set_status(ExportStatus::Exporting)
    }

    fn finish(&self, status: ExportStatus) -> Result<ExportState> {
        self.mutate(|state| {
            transition(state, status)?;
            state.end_time = Some(Utc::now());
            state.finished_at = Some(Instant::now());
            state.current_document = None;
            state.current_folder = None;
            state.current_operation = None;
            state.current_format = None;
            Ok(())
        })
    }

    /// Progress of the active session
    pub fn get_progress(&self) -> Option<ExportProgress> {
        self.lock()
            .as_ref()
            .map(|s| ExportProgress::from_state(&s.state))
    }

    /// Snapshot the active session for reporting
    pub fn generate_summary(&self, folders: Vec<FolderSummary>) -> Option<ExportSummary> {
        self.lock()
            .as_ref()
            .map(|s| ExportSummary::from_state(&s.state, folders))
    }

    /// Check export options, returning every violation
    pub fn validate_config(config: &ExportConfig) -> Vec<String> {
        config.validate()
    }
}

impl Default for ExportStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(PartialEq)]
struct ProgressKey {
    processed: usize,
    total: usize,
    document: Option<String>,
    folder: Option<String>,
}

impl ProgressKey {
    fn of(state: &ExportState) -> Self {
        Self {
            processed: state.processed_documents,
            total: state.total_documents,
            document: state.current_document.clone(),
            folder: state.current_folder.clone(),
        }
    }
}

fn transition(state: &mut ExportState, next: ExportStatus) -> Result<()> {
    if !state.status.can_transition_to(next) {
        return Err(QuipError::State(format!(
            "Invalid status transition from {} to {}",
            state.status, next
        )));
    }
    if state.status != next {
        tracing::debug!(from = %state.status, to = %next, "Export status change");
    }
    state.status = next;
    Ok(())
}

fn apply_update(state: &mut ExportState, update: StateUpdate) -> Result<()> {
    if let Some(status) = update.status {
        transition(state, status)?;
    }
    if let Some(total) = update.total_documents {
        state.total_documents = total;
    }
    if let Some(processed) = update.processed_documents {
        state.processed_documents = processed;
    }
    if let Some(successful) = update.successful_documents {
        state.successful_documents = successful;
    }
    if let Some(failed) = update.failed_documents {
        state.failed_documents = failed;
    }
    if let Some(document) = update.current_document {
        state.current_document = document;
    }
    if let Some(folder) = update.current_folder {
        state.current_folder = folder;
    }
    if let Some(operation) = update.current_operation {
        state.current_operation = operation;
    }
    if let Some(format) = update.current_format {
        state.current_format = format;
    }
    if let Some(dir) = update.output_directory {
        state.output_directory = dir;
    }
    Ok(())
}
