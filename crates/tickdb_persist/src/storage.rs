//! # Storage Directory
//!
//! Owns the directory holding one snapshot file per record type.
//!
//! ## Guarantees
//!
//! 1. **Atomic replace**: a flush writes `<key>.tdb.tmp`, syncs it, then
//!    renames it over `<key>.tdb`. A crash mid-write leaves the previous
//!    snapshot intact.
//! 2. **Whole-file load**: a file either decodes completely or the load fails.
//! 3. **Idempotent delete**: removing files that do not exist is not an error.

use crate::error::{PersistError, PersistResult};
use crate::format::TypeImage;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension of committed snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "tdb";

/// Extension of in-flight snapshot files.
pub const TEMP_EXTENSION: &str = "tdb.tmp";

/// Result of flushing one type to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushReport {
    /// Persistence key of the flushed type.
    pub key: String,
    /// Number of live records written.
    pub records: usize,
    /// Size of the file in bytes.
    pub bytes: usize,
}

/// A directory of per-type snapshot files.
#[derive(Clone, Debug)]
pub struct StorageDir {
    root: PathBuf,
}

impl StorageDir {
    /// Opens the storage directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory holding the snapshot files
    /// * `create_if_absent` - Create the directory (and parents) when missing
    ///
    /// # Errors
    ///
    /// [`PersistError::MissingDirectory`] when the directory is absent and
    /// creation was not requested, or an I/O error from creating it.
    pub fn open(path: impl AsRef<Path>, create_if_absent: bool) -> PersistResult<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.is_dir() {
            if !create_if_absent {
                return Err(PersistError::MissingDirectory(root));
            }
            fs::create_dir_all(&root).map_err(|e| PersistError::io(&root, e))?;
            info!(path = %root.display(), "Created storage directory");
        }

        Ok(Self { root })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the committed snapshot for `key`.
    #[must_use]
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{SNAPSHOT_EXTENSION}"))
    }

    /// Path of the in-flight snapshot for `key`.
    #[must_use]
    pub fn temp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{TEMP_EXTENSION}"))
    }

    /// Loads the snapshot for `key`.
    ///
    /// Returns `Ok(None)` when no snapshot has been written yet.
    ///
    /// # Errors
    ///
    /// I/O failures, checksum failures, or a record size different from
    /// `record_size`.
    pub fn load(&self, key: &str, record_size: u32) -> PersistResult<Option<TypeImage>> {
        let path = self.file_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key, "No snapshot on disk");
                return Ok(None);
            }
            Err(e) => return Err(PersistError::io(&path, e)),
        };

        let image = TypeImage::decode(&data, record_size, &path)?;
        info!(
            key,
            records = image.live.len(),
            slots = image.slot_count,
            bytes = data.len(),
            "Loaded snapshot"
        );
        Ok(Some(image))
    }

    /// Writes the snapshot for `key` atomically.
    ///
    /// # Errors
    ///
    /// Any I/O failure. The temp file is removed on failure and the previous
    /// snapshot is left untouched.
    pub fn store(&self, key: &str, image: &TypeImage) -> PersistResult<FlushReport> {
        let final_path = self.file_path(key);
        let temp_path = self.temp_path(key);

        if temp_path.exists() {
            warn!(path = %temp_path.display(), "Removing stale temp file");
            let _ = fs::remove_file(&temp_path);
        }

        let bytes = image.encode();
        if let Err(e) = write_synced(&temp_path, &bytes) {
            warn!(path = %temp_path.display(), error = %e, "Write failed, cleaning up temp file");
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &final_path) {
            warn!(path = %temp_path.display(), error = %e, "Rename failed, cleaning up temp file");
            let _ = fs::remove_file(&temp_path);
            return Err(PersistError::io(&final_path, e));
        }

        debug!(path = %final_path.display(), "Atomic rename completed");

        Ok(FlushReport {
            key: key.to_string(),
            records: image.live.len(),
            bytes: bytes.len(),
        })
    }

    /// Removes the snapshot (and any stale temp file) for `key`.
    ///
    /// Returns whether a snapshot file existed.
    ///
    /// # Errors
    ///
    /// I/O failures other than the file being absent.
    pub fn delete(&self, key: &str) -> PersistResult<bool> {
        let existed = remove_if_present(&self.file_path(key))?;
        remove_if_present(&self.temp_path(key))?;
        if existed {
            info!(key, "Deleted snapshot");
        }
        Ok(existed)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> PersistResult<()> {
    let mut file = File::create(path).map_err(|e| PersistError::io(path, e))?;
    file.write_all(bytes).map_err(|e| PersistError::io(path, e))?;
    file.sync_all().map_err(|e| PersistError::io(path, e))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> PersistResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PersistError::io(path, e)),
    }
}
