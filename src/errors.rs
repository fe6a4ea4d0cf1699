use std::io;

use thiserror::Error;

use crate::types::{ColumnName, SourceId};

/// Error type for table loading, artifact decoding, and lookup-store persistence failures.
#[derive(Debug, Error)]
pub enum PpmError {
    /// A required column has no header (or alias) in the table.
    #[error("table '{table}' is missing required column '{column}'")]
    MissingColumn {
        /// Source table.
        table: SourceId,
        /// Canonical column name.
        column: ColumnName,
    },
    /// The source file is missing or could not be opened.
    #[error("data source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable {
        /// Source path or identifier.
        source_id: SourceId,
        /// Underlying failure.
        reason: String,
    },
    /// The source was read but its contents could not be interpreted.
    #[error("data source '{source_id}' returned inconsistent state: {details}")]
    SourceInconsistent {
        /// Source path or identifier.
        source_id: SourceId,
        /// What was inconsistent.
        details: String,
    },
    /// Reading or writing the override store failed.
    #[error("lookup store failure: {0}")]
    Store(String),
    /// A classifier artifact is corrupt or has the wrong format.
    #[error("classifier artifact failure: {0}")]
    Artifact(String),
    /// Underlying filesystem error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Invalid option or path combination.
    #[error("configuration error: {0}")]
    Configuration(String),
}
