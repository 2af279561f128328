//! End-to-end export runs against a manifest and the local filesystem

use quip_export::adapters::manifest::ManifestSource;
use quip_export::cli::commands::export::{exit_code, local_collaborators};
use quip_export::config::{ExportConfig, ResilienceConfig};
use quip_export::core::export::{ExportOrchestrator, ExportResult};
use quip_export::core::state::ExportStatus;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const MANIFEST: &str = r#"{
    "documents": [
        {"id": "TbYAAAxC3Q1", "title": "Roadmap", "type": "document",
         "folder_path": ["Product"], "content": "Q3 goals"},
        {"id": "TbYAAAxC3Q2", "title": "Design: Review", "type": "document",
         "folder_path": ["Product", "Design"], "content": "mockups"},
        {"id": "Ux2AAAkL9bR", "title": "Standup", "type": "chat",
         "content": "morning"},
        {"id": "Vq9AAAtt7Zp", "title": "Partner Notes", "type": "document",
         "folder_path": ["Partners"], "is_shared": true, "content": "shared"}
    ]
}"#;

fn write_manifest(dir: &Path, manifest: &str) -> std::path::PathBuf {
    let path = dir.join("quip-manifest.json");
    std::fs::write(&path, manifest).unwrap();
    path
}

fn export_config(output: &Path) -> ExportConfig {
    ExportConfig {
        output_directory: output.to_string_lossy().to_string(),
        export_format: "html".to_string(),
        rate_limit_delay_ms: 0,
        retry_attempts: 0,
        ..Default::default()
    }
}

fn resilience() -> ResilienceConfig {
    let mut resilience = ResilienceConfig::default();
    resilience.rate_limit.enabled = false;
    resilience
}

async fn run(manifest: &Path, config: ExportConfig) -> ExportResult {
    let source = Arc::new(ManifestSource::load(manifest).await.unwrap());
    let collaborators = local_collaborators(&config, source).unwrap();
    let orchestrator = ExportOrchestrator::new(collaborators, &resilience());
    orchestrator.start_export(config).await.unwrap()
}

#[tokio::test]
async fn test_html_export_preserves_folder_structure() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), MANIFEST);
    let out = temp.path().join("out");

    let result = run(&manifest, export_config(&out)).await;

    assert!(result.success);
    assert_eq!(result.status, ExportStatus::Completed);
    assert_eq!(result.total_documents, 4);
    assert_eq!(result.successful_documents, 4);
    assert_eq!(result.exported_files.len(), 4);
    assert!(result.total_bytes > 0);
    assert_eq!(exit_code(&result), 0);

    assert!(out.join("Product/Roadmap.html").is_file());
    assert!(out.join("Product/Design/Design_ Review.html").is_file());
    assert!(out.join("Standup.html").is_file());
    assert!(out.join("Shared/Partners/Partner Notes.html").is_file());

    let html = std::fs::read_to_string(out.join("Product/Roadmap.html")).unwrap();
    assert!(html.contains("Q3 goals"));
}

#[tokio::test]
async fn test_shared_documents_can_be_excluded() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), MANIFEST);
    let out = temp.path().join("out");

    let config = ExportConfig {
        include_shared_documents: false,
        ..export_config(&out)
    };
    let result = run(&manifest, config).await;

    assert_eq!(result.total_documents, 3);
    assert!(!out.join("Shared").exists());
}

#[tokio::test]
async fn test_without_folders_documents_land_unfiled() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), MANIFEST);
    let out = temp.path().join("out");

    let config = ExportConfig {
        include_folders: false,
        ..export_config(&out)
    };
    let result = run(&manifest, config).await;

    assert!(result.success);
    assert_eq!(result.successful_documents, 4);
    assert!(out.join("Roadmap.html").is_file());
    assert!(out.join("Design_ Review.html").is_file());
    assert!(out.join("Standup.html").is_file());
    assert!(out.join("Shared/Partner Notes.html").is_file());
    assert!(!out.join("Product").exists());
}

#[tokio::test]
async fn test_second_run_numbers_conflicting_files() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), MANIFEST);
    let out = temp.path().join("out");

    run(&manifest, export_config(&out)).await;
    let second = run(&manifest, export_config(&out)).await;

    assert!(second.success);
    assert!(out.join("Product/Roadmap.html").is_file());
    assert!(out.join("Product/Roadmap (1).html").is_file());
}

#[tokio::test]
async fn test_skip_conflicts_keeps_existing_files() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), MANIFEST);
    let out = temp.path().join("out");

    std::fs::create_dir_all(out.join("Product")).unwrap();
    std::fs::write(out.join("Product/Roadmap.html"), "keep me").unwrap();

    let config = ExportConfig {
        conflict_resolution: "skip".to_string(),
        ..export_config(&out)
    };
    let result = run(&manifest, config).await;

    assert!(result.success);
    assert_eq!(
        std::fs::read_to_string(out.join("Product/Roadmap.html")).unwrap(),
        "keep me"
    );
    assert!(!out.join("Product/Roadmap (1).html").exists());
}

#[tokio::test]
async fn test_multiple_formats_into_format_directories() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), MANIFEST);
    let out = temp.path().join("out");

    let config = ExportConfig {
        export_formats: vec!["markdown".to_string()],
        use_format_directories: true,
        preserve_folder_structure: false,
        include_shared_documents: false,
        ..export_config(&out)
    };
    let result = run(&manifest, config).await;

    assert!(result.success);
    assert_eq!(result.exported_files.len(), 6);
    assert!(out.join("html/Roadmap.html").is_file());
    assert!(out.join("md/Roadmap.md").is_file());
    assert!(out.join("md/Standup.md").is_file());

    let markdown = std::fs::read_to_string(out.join("md/Roadmap.md")).unwrap();
    assert!(markdown.starts_with("<!-- id: TbYAAAxC3Q1 -->"));
}

#[tokio::test]
async fn test_native_export_reads_sources_and_falls_back_to_html() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("files")).unwrap();
    std::fs::write(temp.path().join("files/budget.xlsx"), b"PK\x03\x04budget").unwrap();

    let manifest = write_manifest(
        temp.path(),
        r#"{
            "documents": [
                {"id": "Wb1AAAxx1", "title": "Budget", "type": "spreadsheet",
                 "source": "files/budget.xlsx"},
                {"id": "Wb1AAAxx2", "title": "Memo", "type": "document",
                 "content": "no docx rendering for this one"}
            ]
        }"#,
    );
    let out = temp.path().join("out");

    let config = ExportConfig {
        export_format: "native".to_string(),
        ..export_config(&out)
    };
    let result = run(&manifest, config).await;

    assert!(result.success);
    assert_eq!(std::fs::read(out.join("Budget.xlsx")).unwrap(), b"PK\x03\x04budget");
    assert!(out.join("Memo.html").is_file());
    assert!(!out.join("Memo.docx").exists());
}

#[tokio::test]
async fn test_missing_source_is_a_partial_failure() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(
        temp.path(),
        r#"{
            "documents": [
                {"id": "Xc1AAAyy1", "title": "Forecast", "type": "spreadsheet",
                 "source": "files/missing.xlsx"},
                {"id": "Xc1AAAyy2", "title": "Notes", "type": "document",
                 "content": "fine"}
            ]
        }"#,
    );
    let out = temp.path().join("out");

    let config = ExportConfig {
        export_format: "native".to_string(),
        export_formats: vec!["html".to_string()],
        ..export_config(&out)
    };
    let result = run(&manifest, config).await;

    assert!(!result.success);
    assert_eq!(result.status, ExportStatus::Completed);
    assert_eq!(result.successful_documents, 1);
    assert_eq!(result.failed_documents, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].document_title, "Forecast");
    assert_eq!(exit_code(&result), 1);
    assert!(out.join("Notes.html").is_file());
}

#[tokio::test]
async fn test_max_documents_limits_run() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), MANIFEST);
    let out = temp.path().join("out");

    let config = ExportConfig {
        max_documents: Some(2),
        ..export_config(&out)
    };
    let result = run(&manifest, config).await;

    assert_eq!(result.total_documents, 2);
    assert_eq!(result.exported_files.len(), 2);
}
