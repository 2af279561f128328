//! Configuration management for quip-export.
//!
//! # Overview
//!
//! quip-export uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `QUIP_EXPORT_*` environment overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Application settings (log level, dry run)
//! - [`ExportConfig`] - Options for one export run
//! - [`ResilienceConfig`] - Rate limiter, circuit breaker, batch and error handler tuning
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [export]
//! output_directory = "${HOME}/quip-backup"
//! export_format = "native"
//! export_formats = ["html"]
//! rate_limit_delay_ms = 1000
//! retry_attempts = 3
//! conflict_resolution = "number"
//!
//! [resilience.rate_limit]
//! requests_per_second = 2.0
//! burst_size = 5
//!
//! [resilience.circuit_breaker]
//! failure_threshold = 5
//! recovery_timeout_ms = 60000
//! ```
//!
//! ```rust,no_run
//! use quip_export::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("quip-export.toml")?;
//! println!("Exporting to {}", config.export.output_directory);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod schema;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    AppConfig, ApplicationConfig, BatchSettings, CircuitBreakerSettings, ErrorHandlingSettings,
    ExportConfig, LoggingConfig, RateLimitSettings, ResilienceConfig, CONFLICT_RESOLUTION_MODES,
};
