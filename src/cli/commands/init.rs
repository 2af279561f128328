//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "quip-export.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing quip-export configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. List the documents to export in quip-manifest.json");
                println!("  3. Validate configuration: quip-export validate-config");
                println!("  4. Preview the export: quip-export export --dry-run");
                println!("  5. Run export: quip-export export");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# quip-export Configuration File

[application]
log_level = "info"
dry_run = false

[export]
output_directory = "./quip-export"
export_format = "native"
export_formats = []
include_shared_documents = true
rate_limit_delay_ms = 1000
retry_attempts = 3
preserve_folder_structure = true
sanitize_file_names = true
conflict_resolution = "number"
use_format_directories = false
batch_concurrency = 1

[resilience.rate_limit]
enabled = true
requests_per_second = 2.0
burst_size = 5

[resilience.circuit_breaker]
failure_threshold = 5
recovery_timeout_ms = 60000
success_threshold = 2
monitoring_window_ms = 120000
minimum_requests = 10

[logging]
local_enabled = true
local_path = "./logs"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# quip-export Configuration File
#
# This file contains all configuration options with examples and explanations.
# Values may reference environment variables as ${VAR_NAME}, and any
# QUIP_EXPORT_<SECTION>_<KEY> environment variable overrides the file.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# Dry run mode (discover and plan, don't write files)
dry_run = false

# ============================================================================
# Export Configuration
# ============================================================================
[export]
# Root directory for exported files
# output_directory = "${HOME}/quip-backup"
output_directory = "./quip-export"

# Primary format: native (docx/xlsx/pdf), html, or markdown
export_format = "native"

# Additional formats; every document is exported to each
export_formats = ["html"]

# Upper bound on exported documents (omit for all)
# max_documents = 500

# Include documents shared with you
include_shared_documents = true

# Include folder metadata in discovery (false exports everything unfiled)
include_folders = true

# Pause between batches in milliseconds
rate_limit_delay_ms = 1000

# Retry attempts per document for transient failures (0-10)
retry_attempts = 3

# Mirror the remote folder hierarchy locally
preserve_folder_structure = true

# Replace characters that are invalid in file names
sanitize_file_names = true

# Existing files: number (Notes (1).html), overwrite, or skip
conflict_resolution = "number"

# Write each format into its own sub-directory (html/, md/, ...)
use_format_directories = false

# Documents exported concurrently within a batch (1-16)
batch_concurrency = 1

# ============================================================================
# Resilience Configuration
# ============================================================================
[resilience.rate_limit]
# Token bucket in front of every call to the document service
enabled = true
requests_per_second = 2.0
burst_size = 5

[resilience.circuit_breaker]
# Failures within the window that open a circuit
failure_threshold = 5

# Wait after the last failure before probing again
recovery_timeout_ms = 60000

# Consecutive probe successes that close the circuit
success_threshold = 2

# Rolling window for failure counting
monitoring_window_ms = 120000

# Calls the window must hold before the threshold applies
minimum_requests = 10

[resilience.batch]
# Generic batch executor tuning
batch_size = 10
concurrency = 3
rate_limit_delay_ms = 1000
max_retries = 3
retry_delay_ms = 1000
exponential_backoff = true

# Pause between batches while resident memory exceeds this (MB)
memory_threshold_mb = 512

[resilience.error_handling]
# Categorized errors kept for reports and abort decisions
max_history_size = 1000

# Replace the recovery strategy of an error category
# (retry, skip, fallback, abort, manual)
# [resilience.error_handling.strategy_overrides]
# client = "fallback"

# ============================================================================
# Logging Configuration
# ============================================================================
[logging]
# Enable local JSON log files
local_enabled = true

# Local log file directory
local_path = "./logs"

# Log rotation (daily, hourly, never)
local_rotation = "daily"

# Emit console logs as JSON
json_console = false
"#
        .to_string()
    }
}
