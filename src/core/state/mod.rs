//! Export session state and progress tracking

pub mod manager;
pub mod session;

pub use manager::ExportStateManager;
pub use session::{
    ExportError, ExportProgress, ExportSession, ExportState, ExportStatus, ExportSummary,
    FolderSummary, StateEvent, StateUpdate, MAX_SESSION_ERRORS,
};
