//! Export orchestration and batch processing
//!
//! This module provides the core export logic for quip-export, including:
//! - Export orchestration over pluggable collaborators
//! - Per-document export tasks
//! - Generic prioritized batch execution
//! - Result reporting

pub mod batch;
pub mod memory;
pub mod orchestrator;
pub mod summary;
pub mod task;

pub use batch::{
    BatchEvent, BatchItem, BatchProcessor, BatchProcessorConfig, BatchRunResult, BatchStatistics,
    ItemStatus,
};
pub use orchestrator::{
    ExportCollaborators, ExportErrorReport, ExportOrchestrator, ExportStatusReport,
    DOCUMENT_DISCOVERY_CIRCUIT, DOCUMENT_EXPORT_CIRCUIT, FILE_WRITE_CIRCUIT,
};
pub use summary::ExportResult;
pub use task::{batch_size_for, DocumentExportTask, TaskStatus};
