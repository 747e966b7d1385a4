//! CLI error type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// A declaration file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A declaration file is not valid JSON for an entity.
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The registry refused the operation.
    #[error(transparent)]
    Registry(#[from] mdschema_core::Error),

    /// The registry store could not be opened.
    #[error(transparent)]
    Store(#[from] mdschema_core::StoreError),
}
