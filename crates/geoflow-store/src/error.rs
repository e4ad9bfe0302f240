//! Error types for the geoflow metrics store.

use thiserror::Error;

/// Result type alias for metrics store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during metrics store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Malformed rows and unknown tables never heal on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Open(_)
                | StoreError::Transaction(_)
                | StoreError::Table(_)
                | StoreError::Read(_)
                | StoreError::Write(_)
        )
    }
}
