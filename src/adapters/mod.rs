//! External system integrations for quip-export.
//!
//! The export pipeline talks to the outside world only through the traits
//! in [`traits`]:
//!
//! - [`traits::DocumentDiscovery`] - lists remote documents
//! - [`traits::DocumentExporter`] - renders a document in a format
//! - [`traits::FolderMapper`] - resolves local directories
//! - [`traits::FileWriter`] - writes files
//! - [`traits::DirectoryManager`] - prepares the export root
//!
//! # Implementations
//!
//! - [`local`] - Local filesystem folder mapper, file writer and directory manager
//! - [`manifest`] - JSON manifest acting as discovery and exporter
//!
//! ```rust,no_run
//! use quip_export::adapters::local::{ConflictResolution, LocalFileWriter};
//! use quip_export::adapters::manifest::ManifestSource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ManifestSource::load("manifest.json").await?;
//! let writer = LocalFileWriter::new(ConflictResolution::Number, true);
//! println!("{} documents listed", source.len());
//! # Ok(())
//! # }
//! ```

pub mod local;
pub mod manifest;
pub mod traits;
