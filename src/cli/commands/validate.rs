//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the quip-export configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as part of loading
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                return Ok(2);
            }
        };

        let export = &config.export;
        let resilience = &config.resilience;

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Output Directory: {}", export.output_directory);
        println!("  Formats: {:?}", export.requested_formats());
        println!(
            "  Max Documents: {}",
            export
                .max_documents
                .map(|m| m.to_string())
                .unwrap_or_else(|| "All".to_string())
        );
        println!("  Retry Attempts: {}", export.retry_attempts);
        println!("  Batch Concurrency: {}", export.batch_concurrency);
        println!("  Conflict Resolution: {}", export.conflict_resolution);
        if resilience.rate_limit.enabled {
            println!(
                "  Rate Limit: {} req/s (burst {})",
                resilience.rate_limit.requests_per_second, resilience.rate_limit.burst_size
            );
        } else {
            println!("  Rate Limit: disabled");
        }
        println!(
            "  Circuit Breaker: open after {} failures, probe after {}ms",
            resilience.circuit_breaker.failure_threshold,
            resilience.circuit_breaker.recovery_timeout_ms
        );
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_validate_missing_file() {
        let args = ValidateArgs {};
        let code = args.execute("/nonexistent/quip-export.toml").await.unwrap();
        assert_eq!(code, 2);
    }

    #[tokio::test]
    async fn test_validate_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[export]\noutput_directory = \"./out\"\nexport_format = \"html\"\n")
            .unwrap();
        file.flush().unwrap();

        let args = ValidateArgs {};
        let code = args.execute(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_validate_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[export]\nexport_format = \"pdf\"\n").unwrap();
        file.flush().unwrap();

        let args = ValidateArgs {};
        let code = args.execute(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(code, 2);
    }
}
