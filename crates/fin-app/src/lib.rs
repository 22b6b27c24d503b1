//! Application layer for fin.
//!
//! This crate turns stored tasks into editable plain-text documents and
//! applies the user's edits back to storage. It also provides configuration,
//! pre-edit backups and editor launching shared by the CLI.

pub mod backup;
pub mod config;
pub mod document;
pub mod editor;
pub mod reconcile;
pub mod session;
pub mod task_patch;
pub mod task_store;

// Re-exports for convenience
pub use backup::{Backup, BackupError, BackupHandle, BackupMetadata, FileBackup, NoBackup};
pub use config::FinConfig;
pub use document::{ParsedLine, TaskLine, parse_document, parse_line, render};
pub use editor::{CommandEditor, EditorError, EditorExit, EditorLauncher};
pub use reconcile::{
    ChangeCounts, ChangeSet, CreatedTask, ReconcileError, ReconcilePlan, Reconciler, reconcile,
    reconcile_document,
};
pub use session::{EditSession, SessionController, SessionError, SessionFilter, SessionOutcome};
pub use task_patch::{SetDiff, TaskEditData, TaskPatch, Transition, diff_sets};
pub use task_store::TaskStore;
