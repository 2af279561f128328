//! JSON manifest document source
//!
//! Serves discovery and rendering from a local manifest, for offline runs
//! and rehearsals of large exports. Each entry describes a document and
//! either carries its text inline (`content`) or points at a file holding its
//! native rendering (`source`, relative to the manifest).
//!
//! ```json
//! {
//!   "documents": [
//!     {"id": "TbYAAAxC3Q1", "title": "Roadmap", "type": "document",
//!      "folder_path": ["Product"], "content": "Q3 goals"},
//!     {"id": "Ux2AAAkL9bR", "title": "Budget", "type": "spreadsheet",
//!      "source": "files/budget.xlsx"}
//!   ]
//! }
//! ```

use crate::adapters::traits::{
    DiscoveryFilter, DiscoveryResult, DocumentDiscovery, DocumentExporter, DocumentRef,
    ExportOptions, ExportedDocument, FolderRef,
};
use crate::domain::{Document, DocumentId, QuipError, ResolvedFormat, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One document in the manifest
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub document: Document,
    /// Inline text used for HTML and Markdown renderings
    #[serde(default)]
    pub content: Option<String>,
    /// File with the native rendering, relative to the manifest
    #[serde(default)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    documents: Vec<ManifestEntry>,
}

/// Document source backed by a manifest
#[derive(Debug, Clone)]
pub struct ManifestSource {
    base_dir: PathBuf,
    entries: Vec<ManifestEntry>,
    by_id: HashMap<DocumentId, usize>,
}

impl ManifestSource {
    /// Build a source from entries; `source` paths resolve against `base_dir`
    pub fn new(entries: Vec<ManifestEntry>, base_dir: impl Into<PathBuf>) -> Self {
        let by_id = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.document.id.clone(), i))
            .collect();
        Self {
            base_dir: base_dir.into(),
            entries,
            by_id,
        }
    }

    /// Load a manifest file
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or isn't a valid manifest.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            QuipError::Configuration(format!(
                "Failed to read manifest {}: {}",
                path.display(),
                e
            ))
        })?;

        let manifest: ManifestFile = serde_json::from_str(&raw).map_err(|e| {
            QuipError::Validation(format!("Invalid manifest {}: {}", path.display(), e))
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tracing::info!(
            manifest = %path.display(),
            documents = manifest.documents.len(),
            "Loaded document manifest"
        );
        Ok(Self::new(manifest.documents, base_dir))
    }

    /// Number of documents in the manifest
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest lists no documents
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn render(
        &self,
        entry: &ManifestEntry,
        format: ResolvedFormat,
        include_metadata: bool,
    ) -> Result<Vec<u8>> {
        let document = &entry.document;
        let text = entry.content.as_deref().unwrap_or_default();

        match format {
            ResolvedFormat::Html => Ok(render_html(document, text, include_metadata).into_bytes()),
            ResolvedFormat::Markdown => {
                let mut out = String::new();
                if include_metadata {
                    out.push_str(&format!("<!-- id: {} -->\n", document.id));
                }
                out.push_str(&format!("# {}\n\n{}\n", document.title, text));
                Ok(out.into_bytes())
            }
            native => {
                let source = entry.source.as_ref().ok_or_else(|| QuipError::Client {
                    status: 422,
                    message: format!("No {} rendering available for {}", native, document.id),
                })?;
                Ok(tokio::fs::read(self.base_dir.join(source)).await?)
            }
        }
    }
}

#[async_trait]
impl DocumentDiscovery for ManifestSource {
    async fn discover_documents(&self, filter: &DiscoveryFilter) -> Result<DiscoveryResult> {
        let matching: Vec<Document> = self
            .entries
            .iter()
            .map(|e| &e.document)
            .filter(|d| filter.matches(d))
            .map(|d| {
                let mut document = d.clone();
                if !filter.include_folders {
                    document.folder_id = None;
                    document.folder_path.clear();
                }
                document
            })
            .collect();
        let filtered_count = matching.len();

        let documents: Vec<Document> = match filter.max_documents {
            Some(max) => matching.into_iter().take(max).collect(),
            None => matching,
        };

        let mut folders: Vec<FolderRef> = Vec::new();
        for document in &documents {
            let folder = FolderRef::for_document(document);
            if !folder.full_path.is_empty() && !folders.contains(&folder) {
                folders.push(folder);
            }
        }

        Ok(DiscoveryResult {
            documents,
            total_count: self.entries.len(),
            filtered_count,
            folders,
        })
    }
}

#[async_trait]
impl DocumentExporter for ManifestSource {
    async fn export_document(
        &self,
        document: &DocumentRef,
        options: &ExportOptions,
    ) -> Result<ExportedDocument> {
        let entry = self
            .by_id
            .get(&document.id)
            .and_then(|i| self.entries.get(*i))
            .ok_or_else(|| QuipError::Client {
                status: 404,
                message: format!("Document not found: {}", document.id),
            })?;

        let mut format = options.preferred_format;
        if !format.is_compatible_with(document.doc_type) {
            if !options.fallback_to_html {
                return Err(QuipError::Client {
                    status: 422,
                    message: format!(
                        "{} documents can't be exported as {}",
                        document.doc_type, format
                    ),
                });
            }
            format = ResolvedFormat::Html;
        }

        let content = match self.render(entry, format, options.include_metadata).await {
            Err(QuipError::Client { .. }) if options.fallback_to_html => {
                format = ResolvedFormat::Html;
                self.render(entry, format, options.include_metadata).await?
            }
            other => other?,
        };

        Ok(ExportedDocument { content, format })
    }
}

fn render_html(document: &Document, text: &str, include_metadata: bool) -> String {
    let mut head = format!("<title>{}</title>", escape_html(&document.title));
    if include_metadata {
        head.push_str(&format!(
            "<meta name=\"document-id\" content=\"{}\"><meta name=\"document-type\" content=\"{}\">",
            escape_html(document.id.as_str()),
            document.doc_type
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html><head>{}</head><body><h1>{}</h1><p>{}</p></body></html>\n",
        head,
        escape_html(&document.title),
        escape_html(text)
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentType;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const MANIFEST: &str = r#"{
        "documents": [
            {"id": "d1", "title": "Roadmap", "type": "document", "folder_path": ["Product"], "content": "Q3 <goals>"},
            {"id": "d2", "title": "Budget", "type": "spreadsheet", "folder_path": ["Finance"], "is_shared": true},
            {"id": "d3", "title": "Standup", "type": "chat", "content": "hello"}
        ]
    }"#;

    fn source() -> ManifestSource {
        let file: ManifestFile = serde_json::from_str(MANIFEST).unwrap();
        ManifestSource::new(file.documents, ".")
    }

    fn doc_ref(id: &str, doc_type: DocumentType) -> DocumentRef {
        DocumentRef {
            id: DocumentId::new(id).unwrap(),
            title: id.to_string(),
            doc_type,
        }
    }

    #[tokio::test]
    async fn test_load_manifest_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        file.flush().unwrap();

        let source = ManifestSource::load(file.path()).await.unwrap();
        assert_eq!(source.len(), 3);
    }

    #[tokio::test]
    async fn test_discovery_applies_filter_and_limit() {
        let source = source();

        let result = source
            .discover_documents(&DiscoveryFilter {
                include_shared: false,
                max_documents: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.total_count, 3);
        assert_eq!(result.filtered_count, 2);
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].id.as_str(), "d1");
        assert_eq!(result.folders.len(), 1);
    }

    #[tokio::test]
    async fn test_discovery_without_folders_returns_unfiled_documents() {
        let result = source()
            .discover_documents(&DiscoveryFilter {
                include_folders: false,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.documents.len(), 3);
        assert!(result.documents.iter().all(|d| d.folder_path.is_empty()));
        assert!(result.folders.is_empty());
    }

    #[tokio::test]
    async fn test_export_html_escapes_content() {
        let exported = source()
            .export_document(
                &doc_ref("d1", DocumentType::Document),
                &ExportOptions {
                    preferred_format: ResolvedFormat::Html,
                    fallback_to_html: false,
                    include_metadata: true,
                },
            )
            .await
            .unwrap();

        let html = String::from_utf8(exported.content).unwrap();
        assert_eq!(exported.format, ResolvedFormat::Html);
        assert!(html.contains("Q3 &lt;goals&gt;"));
        assert!(html.contains("document-id"));
    }

    #[tokio::test]
    async fn test_export_native_reads_source_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("budget.xlsx"), b"PK-bytes").unwrap();

        let file: ManifestFile = serde_json::from_str(
            r#"{"documents": [{"id": "d2", "title": "Budget", "type": "spreadsheet", "source": "budget.xlsx"}]}"#,
        )
        .unwrap();
        let source = ManifestSource::new(file.documents, temp.path());

        let exported = source
            .export_document(
                &doc_ref("d2", DocumentType::Spreadsheet),
                &ExportOptions {
                    preferred_format: ResolvedFormat::Xlsx,
                    fallback_to_html: false,
                    include_metadata: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(exported.content, b"PK-bytes");
        assert_eq!(exported.format, ResolvedFormat::Xlsx);
    }

    #[tokio::test]
    async fn test_missing_native_rendering_falls_back_to_html() {
        let options = ExportOptions {
            preferred_format: ResolvedFormat::Docx,
            fallback_to_html: true,
            include_metadata: false,
        };
        let exported = source()
            .export_document(&doc_ref("d1", DocumentType::Document), &options)
            .await
            .unwrap();
        assert_eq!(exported.format, ResolvedFormat::Html);

        let strict = ExportOptions {
            fallback_to_html: false,
            ..options
        };
        let err = source()
            .export_document(&doc_ref("d1", DocumentType::Document), &strict)
            .await
            .unwrap_err();
        assert!(matches!(err, QuipError::Client { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found() {
        let err = source()
            .export_document(
                &doc_ref("missing", DocumentType::Document),
                &ExportOptions {
                    preferred_format: ResolvedFormat::Html,
                    fallback_to_html: true,
                    include_metadata: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QuipError::Client { status: 404, .. }));
    }
}
