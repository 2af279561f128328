//! Logging and observability
//!
//! Structured logging with:
//! - Human readable or JSON console output
//! - Configurable log levels (`RUST_LOG` overrides the configured level)
//! - Local JSON file logging with rotation
//!
//! # Example
//!
//! ```no_run
//! use quip_export::logging::init_logging;
//! use quip_export::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of an export run
///
/// # Example
///
/// ```no_run
/// use quip_export::log_export_start;
/// use quip_export::domain::SessionId;
///
/// let session_id = SessionId::generate();
/// log_export_start!(session_id, 120);
/// ```
#[macro_export]
macro_rules! log_export_start {
    ($session_id:expr, $total:expr) => {
        tracing::info!(
            session_id = %$session_id,
            total_documents = $total,
            "Starting export"
        );
    };
}

/// Log the completion of an export run
///
/// # Example
///
/// ```no_run
/// use quip_export::log_export_complete;
/// use std::time::Duration;
///
/// log_export_complete!(40, 2, Duration::from_secs(95));
/// ```
#[macro_export]
macro_rules! log_export_complete {
    ($successful:expr, $failed:expr, $duration:expr) => {
        tracing::info!(
            successful = $successful,
            failed = $failed,
            duration_ms = $duration.as_millis() as u64,
            "Export completed"
        );
    };
}

/// Log the start of a batch
///
/// # Example
///
/// ```no_run
/// use quip_export::log_batch_processing;
///
/// log_batch_processing!(3, 10, 5);
/// ```
#[macro_export]
macro_rules! log_batch_processing {
    ($current:expr, $total:expr, $size:expr) => {
        tracing::debug!(
            batch = $current,
            total_batches = $total,
            batch_size = $size,
            progress_pct = ($current as f64 / ($total as f64).max(1.0) * 100.0),
            "Processing batch"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use quip_export::log_retry_attempt;
/// use std::time::Duration;
///
/// log_retry_attempt!("doc-1", 2, 3, Duration::from_secs(4));
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($item:expr, $attempt:expr, $max_attempts:expr, $delay:expr) => {
        tracing::warn!(
            item = %$item,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay.as_millis() as u64,
            "Retrying operation"
        );
    };
}
