//! Configuration schema types
//!
//! This module defines the configuration structure for quip-export. The
//! `[export]` table maps to the options recognised by
//! [`ExportOrchestrator::start_export`](crate::core::export::ExportOrchestrator::start_export);
//! the `[resilience]` tables tune the rate limiter, circuit breakers, batch
//! executor, and error handler.

use crate::core::resilience::{ErrorCategory, RecoveryStrategy};
use crate::domain::ExportFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Conflict resolution modes accepted for existing files
pub const CONFLICT_RESOLUTION_MODES: [&str; 3] = ["number", "overwrite", "skip"];

/// Main quip-export configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Export settings
    pub export: ExportConfig,

    /// Rate limiting, circuit breaker, batch and error handling tuning
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;

        let export_errors = self.export.validate();
        if !export_errors.is_empty() {
            return Err(export_errors.join("; "));
        }

        self.resilience.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (discover and plan, don't export)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Export configuration
///
/// Snapshot of the options for a single export run. Copied into the export
/// session when the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Root directory that receives exported files
    #[serde(default = "default_output_directory")]
    pub output_directory: String,

    /// Primary export format (native, html, markdown)
    #[serde(default = "default_export_format")]
    pub export_format: String,

    /// Additional formats; when non-empty, every document is exported to each
    #[serde(default)]
    pub export_formats: Vec<String>,

    /// Upper bound on discovered documents (None = all)
    #[serde(default)]
    pub max_documents: Option<usize>,

    /// Include documents shared with the user
    #[serde(default = "default_true")]
    pub include_shared_documents: bool,

    /// Include folder metadata in discovery; when false every document
    /// is exported unfiled into the output root
    #[serde(default = "default_true")]
    pub include_folders: bool,

    /// Delay between batches in milliseconds
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: i64,

    /// Retry attempts per document (0-10)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Mirror the remote folder hierarchy locally
    #[serde(default = "default_true")]
    pub preserve_folder_structure: bool,

    /// Replace characters that are invalid in file names
    #[serde(default = "default_true")]
    pub sanitize_file_names: bool,

    /// What to do when the target file exists (number, overwrite, skip)
    #[serde(default = "default_conflict_resolution")]
    pub conflict_resolution: String,

    /// Write each format into its own sub-directory
    #[serde(default)]
    pub use_format_directories: bool,

    /// Documents exported concurrently within a batch
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl ExportConfig {
    /// Validates the export options
    ///
    /// Returns every violation found rather than stopping at the first, so a
    /// caller can surface them together. An empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.output_directory.trim().is_empty() {
            errors.push("export.output_directory cannot be empty".to_string());
        }

        for format in std::iter::once(&self.export_format).chain(self.export_formats.iter()) {
            if !ExportFormat::SUPPORTED.contains(&format.to_lowercase().as_str()) {
                errors.push(format!(
                    "Invalid export format '{}'. Must be one of: {}",
                    format,
                    ExportFormat::SUPPORTED.join(", ")
                ));
            }
        }

        if self.rate_limit_delay_ms < 0 {
            errors.push(format!(
                "export.rate_limit_delay_ms must be >= 0, got {}",
                self.rate_limit_delay_ms
            ));
        }

        if self.retry_attempts > 10 {
            errors.push(format!(
                "export.retry_attempts must be between 0 and 10, got {}",
                self.retry_attempts
            ));
        }

        if !CONFLICT_RESOLUTION_MODES.contains(&self.conflict_resolution.as_str()) {
            errors.push(format!(
                "Invalid export.conflict_resolution '{}'. Must be one of: {}",
                self.conflict_resolution,
                CONFLICT_RESOLUTION_MODES.join(", ")
            ));
        }

        if self.batch_concurrency == 0 || self.batch_concurrency > 16 {
            errors.push(format!(
                "export.batch_concurrency must be between 1 and 16, got {}",
                self.batch_concurrency
            ));
        }

        errors
    }

    /// Parsed list of requested formats, primary first, without duplicates
    ///
    /// Invalid entries are dropped; run [`validate`](Self::validate) first.
    pub fn requested_formats(&self) -> Vec<ExportFormat> {
        let mut formats = Vec::new();
        for raw in std::iter::once(&self.export_format).chain(self.export_formats.iter()) {
            if let Ok(format) = raw.parse::<ExportFormat>() {
                if !formats.contains(&format) {
                    formats.push(format);
                }
            }
        }
        formats
    }

    /// Delay between batches
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms.max(0) as u64)
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            export_format: default_export_format(),
            export_formats: Vec::new(),
            max_documents: None,
            include_shared_documents: true,
            include_folders: true,
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            retry_attempts: default_retry_attempts(),
            preserve_folder_structure: true,
            sanitize_file_names: true,
            conflict_resolution: default_conflict_resolution(),
            use_format_directories: false,
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

/// Resilience tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Default circuit breaker settings
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Token bucket for calls to the document service
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Generic batch executor settings
    #[serde(default)]
    pub batch: BatchSettings,

    /// Error handler settings
    #[serde(default)]
    pub error_handling: ErrorHandlingSettings,
}

impl ResilienceConfig {
    fn validate(&self) -> Result<(), String> {
        self.circuit_breaker.validate()?;
        self.rate_limit.validate()?;
        self.batch.validate()?;
        self.error_handling.validate()?;
        Ok(())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Failures within the window that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Milliseconds after the last failure before a probe is allowed
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Consecutive half-open successes that close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Rolling window length in milliseconds
    #[serde(default = "default_monitoring_window_ms")]
    pub monitoring_window_ms: u64,

    /// Calls the window must hold before the failure threshold applies
    #[serde(default = "default_minimum_requests")]
    pub minimum_requests: u32,
}

impl CircuitBreakerSettings {
    fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("resilience.circuit_breaker.failure_threshold must be > 0".to_string());
        }
        if self.success_threshold == 0 {
            return Err("resilience.circuit_breaker.success_threshold must be > 0".to_string());
        }
        if self.monitoring_window_ms == 0 {
            return Err("resilience.circuit_breaker.monitoring_window_ms must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            success_threshold: default_success_threshold(),
            monitoring_window_ms: default_monitoring_window_ms(),
            minimum_requests: default_minimum_requests(),
        }
    }
}

/// Token bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Enable the token bucket in front of exporter calls
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sustained refill rate
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Bucket capacity
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl RateLimitSettings {
    fn validate(&self) -> Result<(), String> {
        if !(self.requests_per_second > 0.0) {
            return Err(format!(
                "resilience.rate_limit.requests_per_second must be > 0, got {}",
                self.requests_per_second
            ));
        }
        if self.burst_size == 0 {
            return Err("resilience.rate_limit.burst_size must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Batch executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Items per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Items processed concurrently within a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause between batches in milliseconds
    #[serde(default = "default_batch_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Retries per item
    #[serde(default = "default_retry_attempts")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Double the retry delay on every attempt
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,

    /// Resident memory (MB) above which the executor pauses between batches
    #[serde(default = "default_memory_threshold_mb")]
    pub memory_threshold_mb: u64,
}

impl BatchSettings {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("resilience.batch.batch_size must be > 0".to_string());
        }
        if self.concurrency == 0 || self.concurrency > 100 {
            return Err(format!(
                "resilience.batch.concurrency must be between 1 and 100, got {}",
                self.concurrency
            ));
        }
        Ok(())
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            rate_limit_delay_ms: default_batch_delay_ms(),
            max_retries: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: true,
            memory_threshold_mb: default_memory_threshold_mb(),
        }
    }
}

/// Error handler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingSettings {
    /// Categorized errors kept in history
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,

    /// Replaces the built-in recovery strategy of a category,
    /// e.g. `client = "fallback"`
    #[serde(default)]
    pub strategy_overrides: BTreeMap<ErrorCategory, RecoveryStrategy>,
}

impl ErrorHandlingSettings {
    fn validate(&self) -> Result<(), String> {
        if self.max_history_size == 0 {
            return Err("resilience.error_handling.max_history_size must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for ErrorHandlingSettings {
    fn default() -> Self {
        Self {
            max_history_size: default_max_history_size(),
            strategy_overrides: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log file directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Emit console logs as JSON instead of human readable text
    #[serde(default)]
    pub json_console: bool,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            json_console: false,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_output_directory() -> String {
    "./quip-export".to_string()
}

fn default_export_format() -> String {
    "native".to_string()
}

fn default_rate_limit_delay_ms() -> i64 {
    1000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_conflict_resolution() -> String {
    "number".to_string()
}

fn default_batch_concurrency() -> usize {
    1
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_ms() -> u64 {
    60_000
}

fn default_success_threshold() -> u32 {
    2
}

fn default_monitoring_window_ms() -> u64 {
    120_000
}

fn default_minimum_requests() -> u32 {
    10
}

fn default_requests_per_second() -> f64 {
    2.0
}

fn default_burst_size() -> u32 {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_concurrency() -> usize {
    3
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_memory_threshold_mb() -> u64 {
    512
}

fn default_max_history_size() -> usize {
    1000
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig {
            log_level: "info".to_string(),
            dry_run: false,
        };

        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_export_config_default_is_valid() {
        let config = ExportConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.requested_formats(), vec![ExportFormat::Native]);
    }

    #[test]
    fn test_export_config_collects_all_violations() {
        let config = ExportConfig {
            output_directory: "  ".to_string(),
            export_format: "pdf".to_string(),
            rate_limit_delay_ms: -5,
            retry_attempts: 11,
            conflict_resolution: "rename".to_string(),
            ..Default::default()
        };

        let errors = config.validate();
        assert_eq!(errors.len(), 5);
        assert!(errors[0].contains("output_directory"));
        assert!(errors.iter().any(|e| e.contains("'pdf'")));
        assert!(errors.iter().any(|e| e.contains("rate_limit_delay_ms")));
        assert!(errors.iter().any(|e| e.contains("retry_attempts")));
        assert!(errors.iter().any(|e| e.contains("conflict_resolution")));
    }

    #[test]
    fn test_export_config_retry_bounds() {
        let mut config = ExportConfig {
            retry_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_empty());

        config.retry_attempts = 10;
        assert!(config.validate().is_empty());

        config.retry_attempts = 11;
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_requested_formats_dedup() {
        let config = ExportConfig {
            export_format: "html".to_string(),
            export_formats: vec!["markdown".to_string(), "HTML".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.requested_formats(),
            vec![ExportFormat::Html, ExportFormat::Markdown]
        );
    }

    #[test]
    fn test_rate_limit_delay_conversion() {
        let config = ExportConfig {
            rate_limit_delay_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.rate_limit_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_resilience_defaults_are_valid() {
        let config = ResilienceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.rate_limit.burst_size, 5);
        assert_eq!(config.batch.batch_size, 10);
        assert_eq!(config.error_handling.max_history_size, 1000);
    }

    #[test]
    fn test_strategy_overrides_from_toml() {
        let config: AppConfig = toml::from_str(
            "[export]\noutput_directory = \"./out\"\n\n\
             [resilience.error_handling.strategy_overrides]\nclient = \"fallback\"\nfile_system = \"skip\"\n",
        )
        .unwrap();
        let overrides = &config.resilience.error_handling.strategy_overrides;
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides[&ErrorCategory::Client], RecoveryStrategy::Fallback);
        assert_eq!(overrides[&ErrorCategory::FileSystem], RecoveryStrategy::Skip);

        let unknown: Result<AppConfig, _> = toml::from_str(
            "[export]\noutput_directory = \"./out\"\n\n\
             [resilience.error_handling.strategy_overrides]\nclient = \"ignore\"\n",
        );
        assert!(unknown.is_err());
    }

    #[test]
    fn test_rate_limit_validation() {
        let mut settings = RateLimitSettings::default();
        settings.requests_per_second = 0.0;
        assert!(settings.validate().is_err());

        settings.requests_per_second = 1.0;
        settings.burst_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.local_enabled);
        assert_eq!(config.local_path, "./logs");
        assert_eq!(config.local_rotation, "daily");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_minimal_toml() {
        let config: AppConfig = toml::from_str("[export]\noutput_directory = \"./out\"\n").unwrap();
        assert_eq!(config.export.output_directory, "./out");
        assert_eq!(config.application.log_level, "info");
        assert!(config.validate().is_ok());
    }
}
