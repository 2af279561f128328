// quip-export - Resilient batch exporter for Quip documents
// Copyright (c) 2025 quip-export Contributors
// Licensed under the MIT License

//! # quip-export - Resilient batch document export
//!
//! quip-export exports large document collections from a remote document
//! service to the local filesystem without tripping rate limits or failing
//! on the first bad document.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Discovering** documents and planning one export task per document
//! - **Exporting** tasks in batches with bounded concurrency
//! - **Protecting** the remote service with a token-bucket rate limiter and
//!   per-dependency circuit breakers
//! - **Recovering** from failures per document (retry, skip, fallback, abort)
//! - **Tracking** session state with progress events, pause and cancel
//!
//! ## Architecture
//!
//! quip-export follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (export orchestration, resilience, state)
//! - [`adapters`] - Collaborator traits and their local/manifest implementations
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quip_export::adapters::manifest::ManifestSource;
//! use quip_export::cli::commands::export::local_collaborators;
//! use quip_export::config::load_config;
//! use quip_export::core::export::ExportOrchestrator;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("quip-export.toml")?;
//!     let source = Arc::new(ManifestSource::load("quip-manifest.json").await?);
//!
//!     let collaborators = local_collaborators(&config.export, source)?;
//!     let orchestrator = ExportOrchestrator::new(collaborators, &config.resilience);
//!
//!     let result = orchestrator.start_export(config.export.clone()).await?;
//!     println!("Exported {} documents", result.successful_documents);
//!     Ok(())
//! }
//! ```
//!
//! ## Resilience
//!
//! Every call to the document service waits for a rate limiter token and runs
//! through a named circuit breaker. Failures are classified by the
//! [`ErrorHandler`](core::resilience::ErrorHandler), which decides per
//! failure whether to retry with backoff, skip the document, fall back to an
//! alternate format or file name, or abort:
//!
//! ```rust
//! use quip_export::core::resilience::{ErrorCategory, ErrorContext, ErrorHandler};
//! use quip_export::domain::QuipError;
//!
//! let handler = ErrorHandler::new(100);
//! let error = QuipError::Server { status: 503, message: "unavailable".into() };
//! let categorized = handler.categorize(&error, ErrorContext::new("export document"));
//! assert_eq!(categorized.category, ErrorCategory::Server);
//! ```
//!
//! ## Error Handling
//!
//! quip-export uses the [`domain::QuipError`] type for all errors:
//!
//! ```rust,no_run
//! use quip_export::domain::QuipError;
//!
//! fn example() -> Result<(), QuipError> {
//!     // Errors are automatically converted using the ? operator
//!     let config = quip_export::config::load_config("quip-export.toml")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! quip-export uses structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!("Starting export");
//! warn!(document_id = "TbYAAAxC3Q1", "Document skipped");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
