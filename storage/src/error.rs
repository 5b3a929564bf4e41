use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A filesystem operation failed for a reason other than a missing file.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value could not be serialized.
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),

    /// A persisted blob exists but cannot be decoded.
    #[error("corrupted state '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The background writer is gone or could not be started.
    #[error("state writer unavailable: {0}")]
    Worker(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
