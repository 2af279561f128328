//! Document domain model
//!
//! Remote documents, their types, and the export formats they can be
//! rendered to.

use super::ids::DocumentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of remote document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Rich text document
    Document,
    /// Spreadsheet
    Spreadsheet,
    /// Slide deck
    Slides,
    /// Chat room or thread
    Chat,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentType::Document => "document",
            DocumentType::Spreadsheet => "spreadsheet",
            DocumentType::Slides => "slides",
            DocumentType::Chat => "chat",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "document" | "doc" => Ok(DocumentType::Document),
            "spreadsheet" => Ok(DocumentType::Spreadsheet),
            "slides" | "presentation" => Ok(DocumentType::Slides),
            "chat" => Ok(DocumentType::Chat),
            other => Err(format!("Unknown document type: {other}")),
        }
    }
}

/// Export format requested in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// The document type's native office format
    Native,
    /// HTML rendering
    Html,
    /// Markdown rendering
    Markdown,
}

impl ExportFormat {
    /// All formats accepted in configuration
    pub const SUPPORTED: [&'static str; 3] = ["native", "html", "markdown"];
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Native => "native",
            ExportFormat::Html => "html",
            ExportFormat::Markdown => "markdown",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(ExportFormat::Native),
            "html" => Ok(ExportFormat::Html),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(format!(
                "Invalid export format '{}'. Must be one of: {}",
                other,
                ExportFormat::SUPPORTED.join(", ")
            )),
        }
    }
}

/// Concrete on-disk format a document is exported to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedFormat {
    Docx,
    Xlsx,
    Pdf,
    Html,
    Markdown,
}

impl ResolvedFormat {
    /// File extension (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            ResolvedFormat::Docx => "docx",
            ResolvedFormat::Xlsx => "xlsx",
            ResolvedFormat::Pdf => "pdf",
            ResolvedFormat::Html => "html",
            ResolvedFormat::Markdown => "md",
        }
    }

    /// Native format for a document type
    pub fn native_for(doc_type: DocumentType) -> Self {
        match doc_type {
            DocumentType::Document => ResolvedFormat::Docx,
            DocumentType::Spreadsheet => ResolvedFormat::Xlsx,
            DocumentType::Slides => ResolvedFormat::Pdf,
            DocumentType::Chat => ResolvedFormat::Html,
        }
    }

    /// Whether the remote service can render `doc_type` to this format
    pub fn is_compatible_with(&self, doc_type: DocumentType) -> bool {
        match self {
            ResolvedFormat::Html => true,
            ResolvedFormat::Markdown => {
                matches!(doc_type, DocumentType::Document | DocumentType::Chat)
            }
            native => *native == ResolvedFormat::native_for(doc_type),
        }
    }

    /// Resolve a requested format for a document type
    ///
    /// Native requests resolve by type; explicit formats are used as-is unless
    /// the type can't be rendered to them, in which case the native format is
    /// used instead.
    pub fn resolve(requested: ExportFormat, doc_type: DocumentType) -> Self {
        let explicit = match requested {
            ExportFormat::Native => return ResolvedFormat::native_for(doc_type),
            ExportFormat::Html => ResolvedFormat::Html,
            ExportFormat::Markdown => ResolvedFormat::Markdown,
        };

        if explicit.is_compatible_with(doc_type) {
            explicit
        } else {
            tracing::debug!(
                requested = %requested,
                document_type = %doc_type,
                "Requested format incompatible with document type, using native"
            );
            ResolvedFormat::native_for(doc_type)
        }
    }
}

impl fmt::Display for ResolvedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A discovered remote document together with its folder path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Remote identifier
    pub id: DocumentId,

    /// Human readable title
    pub title: String,

    /// Document kind
    #[serde(rename = "type")]
    pub doc_type: DocumentType,

    /// Folder path segments from the root, e.g. `["Engineering", "Specs"]`
    #[serde(default)]
    pub folder_path: Vec<String>,

    /// Identifier of the containing folder, if known
    #[serde(default)]
    pub folder_id: Option<String>,

    /// Whether the document is shared with the current user rather than owned
    #[serde(default)]
    pub is_shared: bool,

    /// Last modification time reported by the service
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Creates a document at the root folder
    pub fn new(id: DocumentId, title: impl Into<String>, doc_type: DocumentType) -> Self {
        Self {
            id,
            title: title.into(),
            doc_type,
            folder_path: Vec::new(),
            folder_id: None,
            is_shared: false,
            updated_at: None,
        }
    }

    /// Sets the folder path
    pub fn with_folder_path<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.folder_path = segments.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the document as shared
    pub fn shared(mut self) -> Self {
        self.is_shared = true;
        self
    }

    /// Folder path rendered with `/` separators
    pub fn folder_display(&self) -> String {
        if self.folder_path.is_empty() {
            "/".to_string()
        } else {
            self.folder_path.join("/")
        }
    }
}

/// Replaces characters that are invalid in file names on common platforms
///
/// Runs of replaced characters collapse to a single underscore, and the
/// result is trimmed of dots and whitespace. Empty results become `untitled`.
pub fn sanitize_file_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_replacement = false;

    for c in name.chars() {
        let invalid = matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            || c.is_control();
        if invalid {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let truncated: String = trimmed.chars().take(200).collect();

    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_resolution_by_type() {
        assert_eq!(
            ResolvedFormat::resolve(ExportFormat::Native, DocumentType::Document),
            ResolvedFormat::Docx
        );
        assert_eq!(
            ResolvedFormat::resolve(ExportFormat::Native, DocumentType::Spreadsheet),
            ResolvedFormat::Xlsx
        );
        assert_eq!(
            ResolvedFormat::resolve(ExportFormat::Native, DocumentType::Slides),
            ResolvedFormat::Pdf
        );
    }

    #[test]
    fn test_explicit_format_used_when_compatible() {
        assert_eq!(
            ResolvedFormat::resolve(ExportFormat::Markdown, DocumentType::Document),
            ResolvedFormat::Markdown
        );
        assert_eq!(
            ResolvedFormat::resolve(ExportFormat::Html, DocumentType::Spreadsheet),
            ResolvedFormat::Html
        );
    }

    #[test]
    fn test_incompatible_format_falls_back_to_native() {
        assert_eq!(
            ResolvedFormat::resolve(ExportFormat::Markdown, DocumentType::Spreadsheet),
            ResolvedFormat::Xlsx
        );
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("HTML".parse::<ExportFormat>().unwrap(), ExportFormat::Html);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_document_folder_display() {
        let doc = Document::new(DocumentId::new("d1").unwrap(), "Plan", DocumentType::Document)
            .with_folder_path(["Team", "Q3"]);
        assert_eq!(doc.folder_display(), "Team/Q3");

        let root = Document::new(DocumentId::new("d2").unwrap(), "Root", DocumentType::Chat);
        assert_eq!(root.folder_display(), "/");
    }

    #[test]
    fn test_document_deserialization() {
        let json = r#"{"id": "abc", "title": "Budget", "type": "spreadsheet", "folder_path": ["Finance"]}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.doc_type, DocumentType::Spreadsheet);
        assert_eq!(doc.folder_path, vec!["Finance".to_string()]);
        assert!(!doc.is_shared);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Q3: Plan/Draft?"), "Q3_ Plan_Draft_");
        assert_eq!(sanitize_file_name("a<>|b"), "a_b");
        assert_eq!(sanitize_file_name("  ..  "), "untitled");
        assert_eq!(sanitize_file_name("normal name"), "normal name");
    }
}
