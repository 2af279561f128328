//! Result alias used across quip-export

use super::errors::QuipError;

/// Result with [`QuipError`] as the error type
///
/// ```
/// use quip_export::domain::{DocumentId, QuipError, Result};
///
/// fn document_id(raw: &str) -> Result<DocumentId> {
///     DocumentId::new(raw).map_err(QuipError::Validation)
/// }
///
/// assert!(document_id("").is_err());
/// ```
pub type Result<T> = std::result::Result<T, QuipError>;
