//! Local filesystem collaborators
//!
//! - [`LocalDirectoryManager`] - Creates the export root
//! - [`LocalFolderMapper`] - Mirrors remote folders below the root
//! - [`LocalFileWriter`] - Writes files with conflict resolution

pub mod directory;
pub mod file_writer;
pub mod folder_mapper;

pub use directory::LocalDirectoryManager;
pub use file_writer::{ConflictResolution, LocalFileWriter};
pub use folder_mapper::{LocalFolderMapper, SHARED_FOLDER_NAME};
