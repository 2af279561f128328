//! Domain models and types for quip-export.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`DocumentId`], [`SessionId`])
//! - **Document model** ([`Document`], [`DocumentType`], [`ExportFormat`], [`ResolvedFormat`])
//! - **Error types** ([`QuipError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, QuipError>`]:
//!
//! ```rust
//! use quip_export::domain::{DocumentId, QuipError, Result};
//!
//! fn parse(raw: &str) -> Result<DocumentId> {
//!     DocumentId::new(raw).map_err(QuipError::Validation)
//! }
//! ```

pub mod document;
pub mod errors;
pub mod ids;
pub mod result;

// Re-export commonly used types for convenience
pub use document::{sanitize_file_name, Document, DocumentType, ExportFormat, ResolvedFormat};
pub use errors::QuipError;
pub use ids::{DocumentId, SessionId};
pub use result::Result;
