//! # Database Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file) is a valid configuration.
//!
//! ```toml
//! workers = 8
//! work_unit_size = 256
//! lock_timeout_ms = 5000
//!
//! [storage]
//! directory = "data/world"
//! wipe = false
//! create_if_absent = true
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where snapshots live and how the directory is treated at open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one snapshot file per record type.
    pub directory: PathBuf,
    /// Delete existing snapshots instead of loading them.
    pub wipe: bool,
    /// Create the directory when it does not exist.
    pub create_if_absent: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("tickdb_data"),
            wipe: false,
            create_if_absent: true,
        }
    }
}

/// Tuning for one database instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Snapshot storage.
    pub storage: StorageConfig,
    /// Worker threads executing update callbacks.
    pub workers: usize,
    /// Objects per work unit handed to a worker.
    pub work_unit_size: usize,
    /// Slots per storage segment.
    pub segment_size: usize,
    /// Hard ceiling on slots per record type; `None` for unbounded.
    pub max_objects_per_type: Option<u32>,
    /// How long phase transitions wait for the structural lock.
    pub lock_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            workers: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            work_unit_size: 256,
            segment_size: 1024,
            max_objects_per_type: None,
            lock_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    /// Scratch configuration: wipes and creates `directory`, two workers,
    /// small work units so tests exercise several of them.
    #[must_use]
    pub fn ephemeral(directory: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                directory: directory.into(),
                wipe: true,
                create_if_absent: true,
            },
            workers: 2,
            work_unit_size: 16,
            segment_size: 64,
            max_objects_per_type: None,
            lock_timeout_ms: 1_000,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`]
    /// for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.work_unit_size == 0 {
            return Err(ConfigError::Invalid("work_unit_size must be at least 1".into()));
        }
        if self.segment_size == 0 {
            return Err(ConfigError::Invalid("segment_size must be at least 1".into()));
        }
        if self.max_objects_per_type == Some(0) {
            return Err(ConfigError::Invalid("max_objects_per_type must be at least 1".into()));
        }
        if self.storage.directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.directory must not be empty".into()));
        }
        Ok(())
    }

    /// Lock timeout as a [`Duration`].
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
