//! Integration tests for configuration loading and validation
//!
//! Note: Tests that modify environment variables take ENV_MUTEX so they
//! don't interfere with each other.

use quip_export::config::load_config;
use quip_export::core::state::ExportStateManager;
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Helper function to clean up environment variables
fn cleanup_env_vars() {
    std::env::remove_var("QUIP_EXPORT_APPLICATION_LOG_LEVEL");
    std::env::remove_var("QUIP_EXPORT_APPLICATION_DRY_RUN");
    std::env::remove_var("QUIP_EXPORT_EXPORT_OUTPUT_DIRECTORY");
    std::env::remove_var("QUIP_EXPORT_EXPORT_MAX_DOCUMENTS");
    std::env::remove_var("QUIP_EXPORT_RATE_LIMIT_REQUESTS_PER_SECOND");
    std::env::remove_var("TEST_QUIP_BACKUP_DIR");
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config(
        r#"
[application]
log_level = "debug"
dry_run = true

[export]
output_directory = "/tmp/quip-backup"
export_format = "html"
export_formats = ["markdown"]
max_documents = 250
include_shared_documents = false
rate_limit_delay_ms = 500
retry_attempts = 5
preserve_folder_structure = false
sanitize_file_names = true
conflict_resolution = "overwrite"
use_format_directories = true
batch_concurrency = 4

[resilience.circuit_breaker]
failure_threshold = 3
recovery_timeout_ms = 30000
success_threshold = 1
monitoring_window_ms = 60000
minimum_requests = 5

[resilience.rate_limit]
enabled = true
requests_per_second = 4.0
burst_size = 8

[resilience.batch]
batch_size = 20
concurrency = 2

[resilience.error_handling]
max_history_size = 200

[logging]
local_enabled = false
local_rotation = "hourly"
json_console = true
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "debug");
    assert!(config.application.dry_run);
    assert_eq!(config.export.output_directory, "/tmp/quip-backup");
    assert_eq!(config.export.max_documents, Some(250));
    assert!(!config.export.include_shared_documents);
    assert_eq!(config.export.retry_attempts, 5);
    assert_eq!(config.export.conflict_resolution, "overwrite");
    assert_eq!(config.export.batch_concurrency, 4);
    assert_eq!(config.export.requested_formats().len(), 2);
    assert_eq!(config.resilience.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.resilience.rate_limit.burst_size, 8);
    assert_eq!(config.resilience.batch.batch_size, 20);
    assert_eq!(config.resilience.error_handling.max_history_size, 200);
    assert_eq!(config.logging.local_rotation, "hourly");
    assert!(config.logging.json_console);
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config("[export]\n");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.export.export_format, "native");
    assert_eq!(config.export.rate_limit_delay_ms, 1000);
    assert_eq!(config.export.retry_attempts, 3);
    assert_eq!(config.export.batch_concurrency, 1);
    assert!(config.resilience.rate_limit.enabled);
    assert_eq!(config.resilience.circuit_breaker.minimum_requests, 10);
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    std::env::set_var("TEST_QUIP_BACKUP_DIR", "/data/quip");

    let file = write_config(
        r#"
[export]
# comments may mention ${UNSET_VARIABLE} freely
output_directory = "${TEST_QUIP_BACKUP_DIR}/exports"
"#,
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.export.output_directory, "/data/quip/exports");

    cleanup_env_vars();
}

#[test]
fn test_missing_env_var_is_reported() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config("[export]\noutput_directory = \"${TEST_QUIP_BACKUP_DIR}\"\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("TEST_QUIP_BACKUP_DIR"));
}

#[test]
fn test_env_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    std::env::set_var("QUIP_EXPORT_APPLICATION_LOG_LEVEL", "warn");
    std::env::set_var("QUIP_EXPORT_EXPORT_OUTPUT_DIRECTORY", "/override");
    std::env::set_var("QUIP_EXPORT_EXPORT_MAX_DOCUMENTS", "7");
    std::env::set_var("QUIP_EXPORT_RATE_LIMIT_REQUESTS_PER_SECOND", "0.5");

    let file = write_config("[export]\noutput_directory = \"./out\"\n");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "warn");
    assert_eq!(config.export.output_directory, "/override");
    assert_eq!(config.export.max_documents, Some(7));
    assert_eq!(config.resilience.rate_limit.requests_per_second, 0.5);

    cleanup_env_vars();
}

#[test]
fn test_invalid_export_options_fail_validation() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config(
        r#"
[export]
export_format = "pdf"
rate_limit_delay_ms = -5
conflict_resolution = "rename"
"#,
    );
    let message = load_config(file.path()).unwrap_err().to_string();

    // every violation is reported, not just the first
    assert!(message.contains("Invalid export format 'pdf'"));
    assert!(message.contains("rate_limit_delay_ms"));
    assert!(message.contains("conflict_resolution"));
}

#[test]
fn test_state_manager_validation_matches_config() {
    let config = quip_export::config::ExportConfig {
        retry_attempts: 20,
        batch_concurrency: 0,
        ..Default::default()
    };

    let violations = ExportStateManager::validate_config(&config);
    assert_eq!(violations.len(), 2);
}

#[test]
fn test_invalid_resilience_settings() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config("[export]\n\n[resilience.rate_limit]\nburst_size = 0\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("burst_size"));
}

#[test]
fn test_missing_file() {
    let err = load_config("/nonexistent/quip-export.toml").unwrap_err();
    assert!(err.to_string().contains("not found"));
}
