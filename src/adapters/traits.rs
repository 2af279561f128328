//! Collaborator traits consumed by the export orchestrator
//!
//! Discovery, rendering, folder layout and file writing live behind these
//! traits so the pipeline can run against the remote service, the local
//! filesystem, or test doubles.

use crate::domain::{Document, DocumentId, DocumentType, ResolvedFormat, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which documents discovery should return
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryFilter {
    /// Include documents shared with the user
    pub include_shared: bool,
    /// Return folder metadata; without it documents come back unfiled
    pub include_folders: bool,
    /// Restrict to these types (empty = all types)
    pub types: Vec<DocumentType>,
    /// Upper bound on returned documents
    pub max_documents: Option<usize>,
}

impl Default for DiscoveryFilter {
    fn default() -> Self {
        Self {
            include_shared: true,
            include_folders: true,
            types: Vec::new(),
            max_documents: None,
        }
    }
}

impl DiscoveryFilter {
    /// Whether `document` passes the shared/type criteria
    pub fn matches(&self, document: &Document) -> bool {
        (self.include_shared || !document.is_shared)
            && (self.types.is_empty() || self.types.contains(&document.doc_type))
    }
}

/// Ownership of a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKind {
    #[default]
    Private,
    Shared,
}

/// Remote folder reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRef {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: FolderKind,
    /// Path segments from the root, including `name`
    #[serde(default)]
    pub full_path: Vec<String>,
}

impl FolderRef {
    /// Folder containing `document`
    pub fn for_document(document: &Document) -> Self {
        Self {
            id: document.folder_id.clone(),
            name: document.folder_path.last().cloned().unwrap_or_default(),
            kind: if document.is_shared {
                FolderKind::Shared
            } else {
                FolderKind::Private
            },
            full_path: document.folder_path.clone(),
        }
    }
}

/// Result of discovery
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub documents: Vec<Document>,
    /// Documents seen before filtering
    pub total_count: usize,
    /// Documents left after filtering
    pub filtered_count: usize,
    pub folders: Vec<FolderRef>,
}

/// Reference passed to the exporter
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRef {
    pub id: DocumentId,
    pub title: String,
    pub doc_type: DocumentType,
}

impl From<&Document> for DocumentRef {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id.clone(),
            title: document.title.clone(),
            doc_type: document.doc_type,
        }
    }
}

/// Rendering options
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub preferred_format: ResolvedFormat,
    /// Render HTML when the preferred format isn't available
    pub fallback_to_html: bool,
    pub include_metadata: bool,
}

/// Rendered document content
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedDocument {
    pub content: Vec<u8>,
    /// Format actually produced
    pub format: ResolvedFormat,
}

/// Local folder resolved for a remote folder
#[derive(Debug, Clone, PartialEq)]
pub struct MappedFolder {
    pub local_path: PathBuf,
    /// Whether the directory was created by this call
    pub created: bool,
}

/// File to write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    /// File name without extension
    pub file_name: String,
    pub content: Vec<u8>,
    pub document_type: DocumentType,
    pub format: ResolvedFormat,
}

/// Outcome of a write
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub size: u64,
    /// True when an existing file was kept instead of writing
    pub skipped: bool,
}

/// Lists remote documents
#[async_trait]
pub trait DocumentDiscovery: Send + Sync {
    /// Discover documents matching `filter`
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    async fn discover_documents(&self, filter: &DiscoveryFilter) -> Result<DiscoveryResult>;
}

/// Renders a remote document
#[async_trait]
pub trait DocumentExporter: Send + Sync {
    /// Export `document` in the preferred format
    ///
    /// # Errors
    ///
    /// Returns an error if the document can't be fetched or rendered.
    async fn export_document(
        &self,
        document: &DocumentRef,
        options: &ExportOptions,
    ) -> Result<ExportedDocument>;
}

/// Resolves the local directory for a remote folder
#[async_trait]
pub trait FolderMapper: Send + Sync {
    /// Map `folder` to a local directory, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the directory can't be created.
    async fn map_folder(&self, folder: &FolderRef) -> Result<MappedFolder>;
}

/// Writes exported content to disk
#[async_trait]
pub trait FileWriter: Send + Sync {
    /// Write `request` into `target_dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written.
    async fn write_document(&self, target_dir: &Path, request: &WriteRequest)
        -> Result<WrittenFile>;
}

/// Prepares the export root
#[async_trait]
pub trait DirectoryManager: Send + Sync {
    /// Create the base output directory and return its path
    ///
    /// # Errors
    ///
    /// Returns an error if the directory can't be created or isn't writable.
    async fn initialize_base_directory(&self) -> Result<PathBuf>;
}
