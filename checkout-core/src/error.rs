//! Error types for editor operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for editor operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while editing or saving a checkout page.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Component not found in the document.
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Row not found in the document.
    #[error("Row not found: {0}")]
    RowNotFound(String),

    /// Column index outside the row's layout arity.
    #[error("Column {index} out of range for row {row_id} ({columns} columns)")]
    ColumnOutOfRange {
        /// Row that was targeted.
        row_id: String,
        /// Requested column index.
        index: usize,
        /// Number of columns the row has.
        columns: usize,
    },

    /// A component id would be placed twice.
    #[error("Duplicate component id: {0}")]
    DuplicateId(String),

    /// A configured document limit would be exceeded.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Save blocked by content that cannot be committed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Asset upload failed.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Save gave up waiting for in-flight uploads.
    #[error("Timed out after {0:?} waiting for uploads")]
    Timeout(Duration),

    /// The persistence store rejected the commit.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Another save is already running.
    #[error("A save is already in progress")]
    SaveInProgress,

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether this is a structural lookup failure.
    ///
    /// Lookup failures are local: the document is left untouched and the
    /// caller only needs to be told.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ComponentNotFound(_) | Self::RowNotFound(_) | Self::ColumnOutOfRange { .. }
        )
    }
}

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested page or asset does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The store refused the request.
    #[error("Rejected: {0}")]
    Rejected(String),
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
