//! Solver error types.

use std::time::Duration;

use thiserror::Error;

use geoflow_store::StoreError;

/// Errors that abort a solve.
///
/// Recoverable data gaps never surface here; they are patched with
/// fallbacks and recorded in the response diagnostics.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("metrics store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("schema mismatch in {table} row {key:?}: {reason}")]
    SchemaMismatch {
        table: String,
        key: String,
        reason: String,
    },

    #[error("search space of {size} candidates exceeds the cap of {cap}; retry with the heuristic strategy")]
    SearchSpaceTooLarge { size: u128, cap: u64 },

    #[error("deadline exceeded after {elapsed:?} while {stage}")]
    Timeout { stage: String, elapsed: Duration },
}

pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SolverError::Config(msg.into())
    }

    /// Process exit code for the CLI wrapper.
    pub fn exit_code(&self) -> i32 {
        match self {
            SolverError::Config(_) | SolverError::SchemaMismatch { .. } => 2,
            SolverError::StoreUnavailable(_) => 3,
            SolverError::Timeout { .. } => 4,
            SolverError::SearchSpaceTooLarge { .. } => 5,
        }
    }
}
