//! Export orchestration
//!
//! The [`ExportOrchestrator`] drives a complete export run:
//!
//! 1. Validate the export options and open a session
//! 2. Discover documents and build one task per document
//! 3. Prepare the output directory
//! 4. Export tasks batch by batch through the rate limiter, circuit breakers
//!    and error handler
//! 5. Close the session and report an [`ExportResult`]
//!
//! Per-document failures never fail the run; they are collected in the
//! result. Cancellation and pause are cooperative and observed between
//! documents and at batch boundaries respectively.

use super::memory::relieve_memory_pressure;
use super::summary::ExportResult;
use super::task::{batch_size_for, DocumentExportTask, TaskStatus};
use crate::adapters::traits::{
    DirectoryManager, DiscoveryFilter, DocumentDiscovery, DocumentExporter, ExportOptions,
    FileWriter, FolderMapper, WriteRequest, WrittenFile,
};
use crate::config::{ExportConfig, ResilienceConfig};
use crate::core::resilience::{
    CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStats, ErrorContext,
    ErrorHandler, ErrorReport, ErrorStatistics, FallbackData, RateLimitConfig, RateLimiter,
    RateLimiterStatus, RecoveryDecision,
};
use crate::core::state::{
    ExportError, ExportProgress, ExportState, ExportStateManager, ExportStatus, ExportSummary,
    FolderSummary, StateEvent, StateUpdate,
};
use crate::domain::{Document, QuipError, ResolvedFormat, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Breaker guarding document discovery
pub const DOCUMENT_DISCOVERY_CIRCUIT: &str = "document-discovery";
/// Breaker guarding document rendering
pub const DOCUMENT_EXPORT_CIRCUIT: &str = "document-export";
/// Breaker guarding file writes
pub const FILE_WRITE_CIRCUIT: &str = "file-write";

const CANCELLED_REASON: &str = "Export cancelled";
const ABORTED_REASON: &str = "Export aborted after repeated errors";

/// External collaborators used by the orchestrator
#[derive(Clone)]
pub struct ExportCollaborators {
    pub discovery: Arc<dyn DocumentDiscovery>,
    pub exporter: Arc<dyn DocumentExporter>,
    pub folder_mapper: Arc<dyn FolderMapper>,
    pub file_writer: Arc<dyn FileWriter>,
    pub directory_manager: Arc<dyn DirectoryManager>,
}

/// Live status of the orchestrator
#[derive(Debug, Clone)]
pub struct ExportStatusReport {
    pub is_running: bool,
    pub is_paused: bool,
    pub state: Option<ExportState>,
    pub progress: Option<ExportProgress>,
    pub open_circuits: Vec<String>,
    pub circuit_breakers: Vec<CircuitBreakerStats>,
    /// `None` when rate limiting is disabled
    pub rate_limiter: Option<RateLimiterStatus>,
    pub error_statistics: ErrorStatistics,
}

/// Error report combined with breaker statistics
#[derive(Debug, Clone, Serialize)]
pub struct ExportErrorReport {
    pub errors: ErrorReport,
    pub circuit_breakers: Vec<CircuitBreakerStats>,
}

/// Drives export runs
///
/// One run at a time; the orchestrator is shared by reference (or `Arc`)
/// with whoever needs to cancel, pause, or inspect it.
///
/// # Example
///
/// ```rust,no_run
/// use quip_export::adapters::local::{
///     ConflictResolution, LocalDirectoryManager, LocalFileWriter, LocalFolderMapper,
/// };
/// use quip_export::adapters::manifest::ManifestSource;
/// use quip_export::config::{ExportConfig, ResilienceConfig};
/// use quip_export::core::export::{ExportCollaborators, ExportOrchestrator};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExportConfig::default();
/// let source = Arc::new(ManifestSource::load("manifest.json").await?);
///
/// let collaborators = ExportCollaborators {
///     discovery: source.clone(),
///     exporter: source,
///     folder_mapper: Arc::new(LocalFolderMapper::new(&config.output_directory, true, true)),
///     file_writer: Arc::new(LocalFileWriter::new(ConflictResolution::Number, true)),
///     directory_manager: Arc::new(LocalDirectoryManager::new(&config.output_directory)),
/// };
///
/// let orchestrator = ExportOrchestrator::new(collaborators, &ResilienceConfig::default());
/// let result = orchestrator.start_export(config).await?;
/// println!("{} of {} exported", result.successful_documents, result.total_documents);
/// # Ok(())
/// # }
/// ```
pub struct ExportOrchestrator {
    collaborators: ExportCollaborators,
    state: Arc<ExportStateManager>,
    errors: Arc<ErrorHandler>,
    breakers: Arc<CircuitBreakerManager>,
    rate_limiter: Option<Arc<RateLimiter>>,
    memory_threshold_bytes: u64,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    paused: watch::Sender<bool>,
    in_flight: watch::Sender<usize>,
}

impl ExportOrchestrator {
    /// Create an orchestrator with resilience components built from `resilience`
    pub fn new(collaborators: ExportCollaborators, resilience: &ResilienceConfig) -> Self {
        let rate_limiter = resilience
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::new(RateLimitConfig::from(&resilience.rate_limit))));
        let (paused, _) = watch::channel(false);
        let (in_flight, _) = watch::channel(0usize);

        Self {
            collaborators,
            state: Arc::new(ExportStateManager::new()),
            errors: Arc::new(ErrorHandler::from_settings(&resilience.error_handling)),
            breakers: Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig::from(
                &resilience.circuit_breaker,
            ))),
            rate_limiter,
            memory_threshold_bytes: resilience.batch.memory_threshold_mb * 1024 * 1024,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            paused,
            in_flight,
        }
    }

    /// Use an existing state manager
    pub fn with_state_manager(mut self, state: Arc<ExportStateManager>) -> Self {
        self.state = state;
        self
    }

    /// Handle to the session state manager
    pub fn state_manager(&self) -> Arc<ExportStateManager> {
        Arc::clone(&self.state)
    }

    /// Subscribe to session state and progress events
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.state.subscribe()
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a complete export
    ///
    /// # Errors
    ///
    /// Returns an error when another export is running, the options are
    /// invalid (all violations are listed), discovery fails, or the output
    /// directory can't be prepared. Individual document failures are
    /// reported in the returned [`ExportResult`] instead.
    pub async fn start_export(&self, config: ExportConfig) -> Result<ExportResult> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QuipError::Export(
                "An export is already in progress".to_string(),
            ));
        }
        let _running = RunningGuard(&self.running);

        let token = CancellationToken::new();
        *self.lock_cancel() = token.clone();
        self.paused.send_replace(false);

        let started = Instant::now();
        let session_id = self.state.create_session(config.clone());

        let violations = ExportStateManager::validate_config(&config);
        if !violations.is_empty() {
            let message = format!("Invalid export configuration: {}", violations.join("; "));
            self.state.fail_export(&message)?;
            return Err(QuipError::Validation(message));
        }

        self.state.set_discovering()?;
        let documents = match self.discover(&config).await {
            Ok(documents) => documents,
            Err(e) => {
                self.fail_session(&e);
                return Err(e);
            }
        };
        let mut tasks = build_tasks(documents, &config);

        let base_dir = match self
            .collaborators
            .directory_manager
            .initialize_base_directory()
            .await
        {
            Ok(path) => path,
            Err(e) => {
                self.errors
                    .handle_error(&e, ErrorContext::new("initialize output directory"));
                self.fail_session(&e);
                return Err(e);
            }
        };

        // counters are recorded even when a cancel already ended the session
        track(self.state.initialize_export(tasks.len()));
        track(self.state.update_state(StateUpdate {
            output_directory: Some(base_dir.display().to_string()),
            ..Default::default()
        }));

        if !token.is_cancelled() && self.state.start_export().is_ok() {
            crate::log_export_start!(session_id, tasks.len());
            self.run_batches(&mut tasks, &config, &token).await;
        } else {
            skip_all(&mut tasks, CANCELLED_REASON);
        }

        self.finish_session(&tasks, &token);

        let summary = self
            .state
            .generate_summary(folder_summaries(&tasks))
            .ok_or_else(|| QuipError::State("Export session was cleared mid-run".to_string()))?;

        let files: Vec<_> = tasks
            .iter()
            .flat_map(|t| t.file_paths.iter().cloned())
            .collect();
        let bytes = tasks.iter().map(DocumentExportTask::bytes_written).sum();

        let result = self
            .generate_result(&summary, started.elapsed())
            .with_files(files, bytes);

        crate::log_export_complete!(
            result.successful_documents,
            result.failed_documents,
            result.duration
        );
        Ok(result)
    }

    /// Discover documents and build tasks without exporting anything
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or discovery fails.
    pub async fn plan_export(&self, config: &ExportConfig) -> Result<Vec<DocumentExportTask>> {
        let violations = ExportStateManager::validate_config(config);
        if !violations.is_empty() {
            return Err(QuipError::Validation(format!(
                "Invalid export configuration: {}",
                violations.join("; ")
            )));
        }
        let documents = self.discover(config).await?;
        Ok(build_tasks(documents, config))
    }

    async fn discover(&self, config: &ExportConfig) -> Result<Vec<Document>> {
        let filter = DiscoveryFilter {
            include_shared: config.include_shared_documents,
            include_folders: config.include_folders,
            types: Vec::new(),
            max_documents: config.max_documents,
        };

        if let Some(limiter) = &self.rate_limiter {
            limiter.wait_for_permission().await;
        }

        let discovery = &self.collaborators.discovery;
        let result = self
            .breakers
            .execute(DOCUMENT_DISCOVERY_CIRCUIT, || {
                discovery.discover_documents(&filter)
            })
            .await
            .inspect_err(|e| {
                self.errors
                    .handle_error(e, ErrorContext::new("discover documents"));
            })?;

        let mut documents = result.documents;
        if let Some(max) = config.max_documents {
            documents.truncate(max);
        }

        tracing::info!(
            documents = documents.len(),
            total = result.total_count,
            filtered = result.filtered_count,
            folders = result.folders.len(),
            "Discovery complete"
        );
        Ok(documents)
    }

    async fn run_batches(
        &self,
        tasks: &mut [DocumentExportTask],
        config: &ExportConfig,
        token: &CancellationToken,
    ) {
        let total = tasks.len();
        if total == 0 {
            return;
        }

        let batch_size = batch_size_for(total);
        let total_batches = total.div_ceil(batch_size);
        let concurrency = config.batch_concurrency.max(1);
        let delay = config.rate_limit_delay();

        tracing::info!(
            total_documents = total,
            batch_size,
            total_batches,
            concurrency,
            "Exporting documents"
        );

        for (batch_index, batch) in tasks.chunks_mut(batch_size).enumerate() {
            self.wait_while_paused(token).await;

            if token.is_cancelled() {
                skip_all(batch, CANCELLED_REASON);
                continue;
            }

            crate::log_batch_processing!(batch_index + 1, total_batches, batch.len());

            stream::iter(batch.iter_mut())
                .map(|task| self.process_task(task, config, token))
                .buffer_unordered(concurrency)
                .collect::<Vec<()>>()
                .await;

            if batch_index + 1 < total_batches && !token.is_cancelled() {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => {}
                    }
                }
                relieve_memory_pressure(self.memory_threshold_bytes).await;
            }
        }
    }

    async fn wait_while_paused(&self, token: &CancellationToken) {
        let mut paused = self.paused.subscribe();
        loop {
            let is_paused = *paused.borrow_and_update();
            if !is_paused || token.is_cancelled() {
                return;
            }

            tracing::info!("Export paused, waiting for resume");
            tokio::select! {
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = token.cancelled() => return,
            }
        }
    }

    async fn process_task(
        &self,
        task: &mut DocumentExportTask,
        config: &ExportConfig,
        token: &CancellationToken,
    ) {
        let _in_flight = InFlight::enter(&self.in_flight);

        if token.is_cancelled() {
            task.skip(CANCELLED_REASON);
            return;
        }
        if self.errors.should_abort_operation() {
            task.skip(ABORTED_REASON);
            return;
        }

        task.start();
        let folder = task.document.folder_display();

        for format in task.formats.clone() {
            track(self.state.start_document_export(
                &task.document.title,
                &folder,
                Some(format.extension()),
            ));

            match self.export_format(task, format, config, token).await {
                Ok(file) => task.record_file(file),
                Err(FormatFailure::Cancelled) => {
                    tracing::debug!(document_id = %task.document.id, "Retry cancelled");
                    task.skip(CANCELLED_REASON);
                    return;
                }
                Err(FormatFailure::Failed(message)) => {
                    let error = ExportError::new(
                        task.document.id.as_str(),
                        &task.document.title,
                        &folder,
                        &message,
                    )
                    .with_retry_count(task.retry_count);
                    task.fail(message);
                    track(self.state.fail_document_export(error));
                    return;
                }
            }
        }

        task.complete();
        track(self.state.complete_document_export());
        tracing::debug!(
            document_id = %task.document.id,
            files = task.file_paths.len(),
            bytes = task.bytes_written(),
            "Document exported"
        );
    }

    /// Export one format of a task, applying recovery decisions
    ///
    /// Returns the failure message once recovery gives up.
    async fn export_format(
        &self,
        task: &mut DocumentExportTask,
        format: ResolvedFormat,
        config: &ExportConfig,
        token: &CancellationToken,
    ) -> std::result::Result<WrittenFile, FormatFailure> {
        let max_attempts = config.retry_attempts + 1;
        let mut format = format;
        let mut file_name = task.document.title.clone();
        let mut attempt: u32 = 0;

        loop {
            let (operation, error) = match self.attempt_export(task, format, &file_name, config).await
            {
                Ok(file) => return Ok(file),
                Err(failure) => failure,
            };

            let context = ErrorContext::new(operation)
                .with_document(task.document.id.as_str(), &task.document.title)
                .with_folder(task.document.folder_display())
                .with_attempt(attempt);
            let categorized = self.errors.handle_error(&error, context);
            let decision = self.errors.determine_recovery(&categorized);
            attempt += 1;

            tracing::debug!(
                document_id = %task.document.id,
                category = %categorized.category,
                action = decision.action(),
                attempt,
                "Recovery decided"
            );

            match decision {
                RecoveryDecision::Abort { reason } => return Err(FormatFailure::Failed(reason)),
                RecoveryDecision::Skip => return Err(FormatFailure::Failed(error.to_string())),
                RecoveryDecision::Fallback(FallbackData::AlternateFormat(alternate)) => {
                    format = alternate;
                }
                RecoveryDecision::Fallback(FallbackData::AlternateFileName(name)) => {
                    file_name = name;
                }
                RecoveryDecision::Retry { delay } => {
                    if attempt >= max_attempts {
                        return Err(FormatFailure::Failed(error.to_string()));
                    }
                    crate::log_retry_attempt!(task.document.id, attempt + 1, max_attempts, delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => return Err(FormatFailure::Cancelled),
                    }
                }
            }

            if attempt >= max_attempts {
                return Err(FormatFailure::Failed(error.to_string()));
            }
            task.retry_count += 1;
        }
    }

    /// One pass through rate limiter, exporter, folder mapper, and writer
    ///
    /// Failures carry the name of the step that failed.
    async fn attempt_export(
        &self,
        task: &DocumentExportTask,
        format: ResolvedFormat,
        file_name: &str,
        config: &ExportConfig,
    ) -> std::result::Result<WrittenFile, (&'static str, QuipError)> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait_for_permission().await;
        }

        let document = task.document_ref();
        let options = ExportOptions {
            preferred_format: format,
            fallback_to_html: true,
            include_metadata: true,
        };
        let exporter = &self.collaborators.exporter;
        let exported = self
            .breakers
            .execute(DOCUMENT_EXPORT_CIRCUIT, || {
                exporter.export_document(&document, &options)
            })
            .await
            .map_err(|e| ("export document", e))?;

        let mapped = self
            .collaborators
            .folder_mapper
            .map_folder(&task.folder_ref())
            .await
            .map_err(|e| ("map folder", e))?;

        let target_dir = if config.use_format_directories {
            mapped.local_path.join(exported.format.extension())
        } else {
            mapped.local_path
        };

        let request = WriteRequest {
            file_name: file_name.to_string(),
            content: exported.content,
            document_type: task.document.doc_type,
            format: exported.format,
        };
        let writer = &self.collaborators.file_writer;
        self.breakers
            .execute(FILE_WRITE_CIRCUIT, || {
                writer.write_document(&target_dir, &request)
            })
            .await
            .map_err(|e| ("write file", e))
    }

    fn fail_session(&self, error: &QuipError) {
        if let Err(e) = self.state.fail_export(&error.to_string()) {
            tracing::debug!(error = %e, "Could not mark session failed");
        }
    }

    fn finish_session(&self, tasks: &[DocumentExportTask], token: &CancellationToken) {
        let status = match self.state.get_state() {
            Some(state) => state.status,
            None => return,
        };
        if status.is_terminal() {
            return;
        }
        if status == ExportStatus::Paused {
            track(self.state.resume_export());
        }

        let aborted = !token.is_cancelled()
            && tasks
                .iter()
                .any(|t| t.status == TaskStatus::Skipped && t.error.as_deref() == Some(ABORTED_REASON));

        let outcome = if token.is_cancelled() {
            self.state.cancel_export()
        } else if aborted {
            self.state.fail_export(ABORTED_REASON)
        } else {
            self.state.complete_export()
        };
        track(outcome);
    }

    /// Cancel the running export
    ///
    /// Documents already being exported finish; nothing new starts. Returns
    /// once in-flight documents have drained and the session is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if no export is running.
    pub async fn cancel_export(&self) -> Result<()> {
        self.ensure_running()?;
        tracing::info!("Cancelling export");

        let token = self.lock_cancel().clone();
        token.cancel();

        let mut in_flight = self.in_flight.subscribe();
        let _ = in_flight.wait_for(|count| *count == 0).await;

        if let Some(state) = self.state.get_state() {
            if !state.status.is_terminal() {
                track(self.state.cancel_export());
            }
        }
        Ok(())
    }

    /// Hold back new batches until [`resume_export`](Self::resume_export)
    ///
    /// The current batch runs to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if no export is running or the session can't pause
    /// in its current phase.
    pub fn pause_export(&self) -> Result<()> {
        self.ensure_running()?;
        self.state.pause_export()?;
        self.paused.send_replace(true);
        tracing::info!("Export will pause at the next batch boundary");
        Ok(())
    }

    /// Resume a paused export
    ///
    /// # Errors
    ///
    /// Returns an error if no export is running or the session isn't
    /// paused or exporting.
    pub fn resume_export(&self) -> Result<()> {
        self.ensure_running()?;
        self.state.resume_export()?;
        self.paused.send_replace(false);
        tracing::info!("Export resumed");
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(QuipError::Export("No export in progress".to_string()))
        }
    }

    /// Snapshot of session, progress, breakers, and rate limiter
    pub async fn get_export_status(&self) -> ExportStatusReport {
        ExportStatusReport {
            is_running: self.is_running(),
            is_paused: *self.paused.borrow(),
            state: self.state.get_state(),
            progress: self.state.get_progress(),
            open_circuits: self.breakers.get_open_circuits().await,
            circuit_breakers: self.breakers.get_all_stats().await,
            rate_limiter: self.rate_limiter.as_ref().map(|l| l.get_status()),
            error_statistics: self.errors.statistics(),
        }
    }

    /// Error report with breaker statistics
    pub async fn get_error_report(&self) -> ExportErrorReport {
        ExportErrorReport {
            errors: self.errors.generate_error_report(),
            circuit_breakers: self.breakers.get_all_stats().await,
        }
    }

    /// Clear error history and close every circuit
    pub async fn reset_error_handling(&self) {
        self.errors.reset();
        self.breakers.reset_all().await;
        tracing::info!("Error handling reset");
    }

    /// Turn a session summary into the run result
    pub fn generate_result(&self, summary: &ExportSummary, duration: Duration) -> ExportResult {
        let result = ExportResult::from_summary(summary, duration);
        result.log_summary();
        result
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct InFlight<'a>(&'a watch::Sender<usize>);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|count| *count += 1);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

fn track(outcome: Result<ExportState>) {
    if let Err(e) = outcome {
        tracing::debug!(error = %e, "Session update rejected");
    }
}

fn build_tasks(documents: Vec<Document>, config: &ExportConfig) -> Vec<DocumentExportTask> {
    let formats = config.requested_formats();
    documents
        .into_iter()
        .map(|document| DocumentExportTask::new(document, &formats))
        .collect()
}

/// Why a format could not be exported
enum FormatFailure {
    /// Recovery gave up; carries the message recorded for the document
    Failed(String),
    /// The run was cancelled while waiting to retry
    Cancelled,
}

fn skip_all(tasks: &mut [DocumentExportTask], reason: &str) {
    for task in tasks.iter_mut().filter(|t| !t.status.is_terminal()) {
        task.skip(reason);
    }
}

fn folder_summaries(tasks: &[DocumentExportTask]) -> Vec<FolderSummary> {
    let mut folders: BTreeMap<String, FolderSummary> = BTreeMap::new();
    for task in tasks {
        let path = task.document.folder_display();
        let entry = folders
            .entry(path.clone())
            .or_insert_with(|| FolderSummary {
                folder_path: path,
                document_count: 0,
                successful: 0,
                failed: 0,
            });
        entry.document_count += 1;
        match task.status {
            TaskStatus::Completed => entry.successful += 1,
            TaskStatus::Failed => entry.failed += 1,
            _ => {}
        }
    }
    folders.into_values().collect()
}
