//! Core business logic for quip-export.
//!
//! This module contains the export pipeline and the resilience layer it runs on.
//!
//! # Modules
//!
//! - [`export`] - Export orchestration, tasks, batch processing, and results
//! - [`resilience`] - Rate limiting, circuit breakers, and error handling
//! - [`state`] - Export session state and progress events
//!
//! # Export Workflow
//!
//! The typical export workflow:
//!
//! 1. **Validate**: Check export options, reporting every violation
//! 2. **Discover**: List documents, bounded by `max_documents`
//! 3. **Plan**: Build one task per document with resolved formats
//! 4. **Batch Process**: Export tasks batch by batch through the rate
//!    limiter and circuit breakers, recovering from failures per document
//! 5. **Report**: Close the session and return an export result
//!
//! # Example
//!
//! ```rust,no_run
//! use quip_export::adapters::local::{
//!     ConflictResolution, LocalDirectoryManager, LocalFileWriter, LocalFolderMapper,
//! };
//! use quip_export::adapters::manifest::ManifestSource;
//! use quip_export::config::load_config;
//! use quip_export::core::export::{ExportCollaborators, ExportOrchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration
//! let config = load_config("quip-export.toml")?;
//! let output = &config.export.output_directory;
//!
//! // Wire collaborators
//! let source = Arc::new(ManifestSource::load("manifest.json").await?);
//! let collaborators = ExportCollaborators {
//!     discovery: source.clone(),
//!     exporter: source,
//!     folder_mapper: Arc::new(LocalFolderMapper::new(output, true, true)),
//!     file_writer: Arc::new(LocalFileWriter::new(ConflictResolution::Number, true)),
//!     directory_manager: Arc::new(LocalDirectoryManager::new(output)),
//! };
//!
//! // Execute export
//! let orchestrator = ExportOrchestrator::new(collaborators, &config.resilience);
//! let result = orchestrator.start_export(config.export.clone()).await?;
//!
//! println!("Total: {}", result.total_documents);
//! println!("Successful: {}", result.successful_documents);
//! println!("Failed: {}", result.failed_documents);
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod resilience;
pub mod state;
