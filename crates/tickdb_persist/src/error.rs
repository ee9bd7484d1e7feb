//! # Persistence Error Types
//!
//! All errors that can occur while loading, flushing or deleting snapshot files.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Error, Debug)]
pub enum PersistError {
    /// Underlying filesystem failure.
    #[error("io error on {path}: {source}")]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },

    /// The storage directory does not exist and creation was not requested.
    #[error("storage directory {0} does not exist")]
    MissingDirectory(PathBuf),

    /// Snapshot file failed validation (bad magic, bad checksum, bad layout).
    #[error("corrupt snapshot {path}: {reason}")]
    Corrupt {
        /// The offending file.
        path: PathBuf,
        /// What failed.
        reason: String,
    },

    /// Snapshot was written for a record layout of a different size.
    #[error("record size mismatch in {path}: file has {found} bytes, type declares {expected}")]
    RecordSizeMismatch {
        /// The offending file.
        path: PathBuf,
        /// Size recorded in the file header.
        found: u32,
        /// Size of the registered record type.
        expected: u32,
    },

    /// File ended before the declared content.
    #[error("truncated snapshot {path}: needed {needed} more bytes")]
    Truncated {
        /// The offending file.
        path: PathBuf,
        /// Bytes missing at the point of failure.
        needed: usize,
    },
}

impl PersistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
