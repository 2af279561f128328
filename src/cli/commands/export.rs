//! Export command implementation
//!
//! This module implements the `export` command, which exports the documents
//! listed by a manifest into the local output directory.

use crate::adapters::local::{
    ConflictResolution, LocalDirectoryManager, LocalFileWriter, LocalFolderMapper,
};
use crate::adapters::manifest::ManifestSource;
use crate::config::{load_config, ExportConfig};
use crate::core::export::{ExportCollaborators, ExportOrchestrator, ExportResult};
use crate::core::state::ExportStatus;
use crate::domain::Result;
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

// errors printed in the summary before truncating
const MAX_PRINTED_ERRORS: usize = 10;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Document manifest (JSON) to export from
    #[arg(short, long, default_value = "quip-manifest.json")]
    pub manifest: String,

    /// Override the output directory
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override the export format (native, html, markdown)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Override the maximum number of documents to export
    #[arg(long)]
    pub max_documents: Option<usize>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run mode - discover and plan without writing files
    #[arg(long)]
    pub dry_run: bool,
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting export command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        self.apply_overrides(&mut config.export);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let source = match ManifestSource::load(&self.manifest).await {
            Ok(source) => Arc::new(source),
            Err(e) => {
                tracing::error!(error = %e, manifest = %self.manifest, "Failed to load manifest");
                eprintln!("Failed to load manifest: {e}");
                return Ok(2);
            }
        };

        let collaborators = local_collaborators(&config.export, source)?;
        let orchestrator = ExportOrchestrator::new(collaborators, &config.resilience);

        let dry_run = self.dry_run || config.application.dry_run;
        if dry_run {
            return self.print_plan(&orchestrator, &config.export).await;
        }

        if !self.yes && !confirm(&config.export)? {
            println!("Export cancelled.");
            return Ok(0);
        }

        tracing::info!("Executing export");
        println!("🚀 Starting export...");
        println!();

        let result = match run_until_shutdown(&orchestrator, config.export, shutdown_signal).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                eprintln!("Export failed: {e}");
                return Ok(5);
            }
        };

        print_summary(&result);
        Ok(exit_code(&result))
    }

    fn apply_overrides(&self, export: &mut ExportConfig) {
        if let Some(output) = &self.output {
            tracing::info!(output = %output, "Overriding output directory from CLI");
            export.output_directory = output.clone();
        }
        if let Some(format) = &self.format {
            tracing::info!(format = %format, "Overriding export format from CLI");
            export.export_format = format.clone();
        }
        if let Some(max) = self.max_documents {
            tracing::info!(max_documents = max, "Overriding max documents from CLI");
            export.max_documents = Some(max);
        }
    }

    async fn print_plan(
        &self,
        orchestrator: &ExportOrchestrator,
        export: &ExportConfig,
    ) -> anyhow::Result<i32> {
        tracing::info!("Dry run mode enabled - no files will be written");
        println!("🔍 DRY RUN MODE - No files will be written");
        println!();

        let tasks = match orchestrator.plan_export(export).await {
            Ok(tasks) => tasks,
            Err(e) => {
                eprintln!("Planning failed: {e}");
                return Ok(5);
            }
        };

        println!("Would export {} documents:", tasks.len());
        for task in &tasks {
            let formats: Vec<&str> = task.formats.iter().map(|f| f.extension()).collect();
            println!(
                "  - {} [{}] in {} -> {}",
                task.document.title,
                task.document.doc_type,
                task.document.folder_display(),
                formats.join(", ")
            );
        }
        Ok(0)
    }
}

/// Local filesystem collaborators around a manifest source
///
/// # Errors
///
/// Returns an error if the conflict resolution mode is unknown.
pub fn local_collaborators(
    export: &ExportConfig,
    source: Arc<ManifestSource>,
) -> Result<ExportCollaborators> {
    let conflict_resolution: ConflictResolution = export.conflict_resolution.parse()?;

    Ok(ExportCollaborators {
        discovery: source.clone(),
        exporter: source,
        folder_mapper: Arc::new(LocalFolderMapper::new(
            &export.output_directory,
            export.preserve_folder_structure,
            export.sanitize_file_names,
        )),
        file_writer: Arc::new(LocalFileWriter::new(
            conflict_resolution,
            export.sanitize_file_names,
        )),
        directory_manager: Arc::new(LocalDirectoryManager::new(&export.output_directory)),
    })
}

/// Run an export, cancelling it once `shutdown_signal` turns true
///
/// # Errors
///
/// Returns the error from [`ExportOrchestrator::start_export`].
pub async fn run_until_shutdown(
    orchestrator: &ExportOrchestrator,
    export: ExportConfig,
    mut shutdown_signal: watch::Receiver<bool>,
) -> Result<ExportResult> {
    let run = orchestrator.start_export(export);
    tokio::pin!(run);

    let shutdown = async {
        loop {
            if *shutdown_signal.borrow_and_update() {
                break;
            }
            if shutdown_signal.changed().await.is_err() {
                // sender gone, nobody can ask for shutdown any more
                std::future::pending::<()>().await;
            }
        }
        tracing::info!("Shutdown requested, cancelling export");
        if let Err(e) = orchestrator.cancel_export().await {
            tracing::debug!(error = %e, "Nothing to cancel");
        }
    };

    // the run is polled first so an early signal finds it registered
    tokio::select! {
        biased;
        result = &mut run => result,
        _ = shutdown => run.await,
    }
}

fn confirm(export: &ExportConfig) -> anyhow::Result<bool> {
    use std::io::{self, Write};

    println!("Export Configuration:");
    println!("  Output: {}", export.output_directory);
    println!("  Formats: {:?}", export.requested_formats());
    println!(
        "  Max documents: {}",
        export
            .max_documents
            .map(|m| m.to_string())
            .unwrap_or_else(|| "All".to_string())
    );
    println!("  Include shared: {}", export.include_shared_documents);
    println!("  Conflict resolution: {}", export.conflict_resolution);
    println!();
    print!("Proceed with export? [y/N]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn print_summary(result: &ExportResult) {
    println!();
    println!("📊 Export Summary:");
    println!("  Session: {}", result.session_id);
    println!("  Status: {}", result.status);
    println!("  Total Documents: {}", result.total_documents);
    println!("  Successful: {}", result.successful_documents);
    println!("  Failed: {}", result.failed_documents);
    println!("  Skipped: {}", result.skipped_documents);
    println!("  Files Written: {}", result.exported_files.len());
    println!("  Output: {}", result.output_directory.display());
    println!("  Duration: {:.2}s", result.duration.as_secs_f64());
    println!("  Success Rate: {:.2}%", result.success_rate());
    println!();

    if !result.errors.is_empty() {
        println!("⚠️  Errors encountered:");
        for error in result.errors.iter().take(MAX_PRINTED_ERRORS) {
            println!("  - {} ({}): {}", error.document_title, error.folder_path, error.message);
        }
        if result.errors.len() > MAX_PRINTED_ERRORS {
            println!("  ... and {} more errors", result.errors.len() - MAX_PRINTED_ERRORS);
        }
        println!();
    }
}

/// Process exit code for an export result
///
/// 0 success, 1 partial failure, 130 cancelled.
pub fn exit_code(result: &ExportResult) -> i32 {
    match result.status {
        ExportStatus::Cancelled => {
            println!("⚠️  Export cancelled. Files written so far are kept.");
            tracing::info!("Export interrupted by user signal");
            130
        }
        _ if result.success => {
            println!("✅ Export completed successfully!");
            0
        }
        _ => {
            println!("⚠️  Export completed with failures");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ExportArgs {
        ExportArgs {
            manifest: "quip-manifest.json".to_string(),
            output: None,
            format: None,
            max_documents: None,
            yes: false,
            dry_run: false,
        }
    }

    #[test]
    fn test_export_args_defaults_leave_config_untouched() {
        let mut export = ExportConfig::default();
        args().apply_overrides(&mut export);
        assert_eq!(export, ExportConfig::default());
    }

    #[test]
    fn test_export_args_with_overrides() {
        let args = ExportArgs {
            output: Some("/tmp/out".to_string()),
            format: Some("markdown".to_string()),
            max_documents: Some(5),
            ..args()
        };

        let mut export = ExportConfig::default();
        args.apply_overrides(&mut export);

        assert_eq!(export.output_directory, "/tmp/out");
        assert_eq!(export.export_format, "markdown");
        assert_eq!(export.max_documents, Some(5));
    }

    #[test]
    fn test_local_collaborators_rejects_unknown_conflict_mode() {
        let export = ExportConfig {
            conflict_resolution: "rename".to_string(),
            ..Default::default()
        };
        let source = Arc::new(ManifestSource::new(Vec::new(), "."));
        assert!(local_collaborators(&export, source).is_err());
    }
}
