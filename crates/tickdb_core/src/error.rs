//! Error types for the database core.
//!
//! Recoverable conditions only. Misuse that would corrupt the store
//! (stale destroy, capacity exhaustion, out-of-order frame calls) panics.

use std::path::PathBuf;
use thiserror::Error;
use tickdb_persist::PersistError;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Snapshot storage failure.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The structural lock could not be taken in time.
    #[error("{operation} timed out after {timeout_ms}ms waiting for the structural lock")]
    LockTimeout {
        /// Operation that gave up.
        operation: &'static str,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// Worker threads could not be started.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// A tick was requested after graceful shutdown began.
    #[error("database is shutting down")]
    ShuttingDown,

    /// Two descriptors share a type tag.
    #[error("type id {0} registered twice")]
    DuplicateType(u16),

    /// Two descriptors share a persistence key.
    #[error("persistence key {0:?} registered twice")]
    DuplicatePersistKey(&'static str),

    /// A snapshot decoded cleanly but does not describe a valid store.
    #[error("snapshot {key:?} is inconsistent: {reason}")]
    InconsistentSnapshot {
        /// Persistence key of the type.
        key: String,
        /// What was wrong.
        reason: String,
    },
}

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
