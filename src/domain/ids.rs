//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that flow through an export run.
//! Each type ensures type safety so a document ID can't be passed where a
//! session ID is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Remote document identifier
///
/// Opaque identifier assigned by the remote document service.
///
/// # Examples
///
/// ```
/// use quip_export::domain::ids::DocumentId;
/// use std::str::FromStr;
///
/// let id = DocumentId::from_str("TbYAAAxC3Q1").unwrap();
/// assert_eq!(id.as_str(), "TbYAAAxC3Q1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a new DocumentId from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(DocumentId)` if the ID is valid, `Err` otherwise
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Document ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the document ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Export session identifier
///
/// Generated fresh for every session created by the state manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a new random session ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "export-{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("export-").unwrap_or(s);
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|e| format!("Invalid session ID '{s}': {e}"))
    }
}
