//! Error types for fin store operations.

use fin_core::id::TaskId;
use thiserror::Error;

/// Errors that can occur during `SqliteStore` operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite returned an error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored column could not be decoded.
    #[error("Corrupt value in column '{field}' of task {id}: {value}")]
    Corrupt {
        /// Row identifier.
        id: TaskId,
        /// Column name.
        field: &'static str,
        /// Raw column value.
        value: String,
    },

    /// Content was empty after trimming.
    #[error("Task content must not be empty")]
    EmptyContent,
}
