//! Demo configuration and seeding.
//!
//! ```toml
//! spawners = 4
//! unit_ttl = 30
//!
//! [database]
//! workers = 4
//!
//! [database.storage]
//! directory = "data/demo"
//!
//! [frame_loop]
//! tick_rate = 60
//! frames = 600
//! ```

use crate::frame_loop::LoopConfig;
use crate::simulation::{Location, Spawner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tickdb_core::{ConfigError, Database, DatabaseConfig, Record};
use tracing::info;

/// Everything the demo binary reads from its config file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Database tuning and storage.
    pub database: DatabaseConfig,
    /// Frame pacing.
    pub frame_loop: LoopConfig,
    /// Spawners seeded into an empty database.
    pub spawners: u32,
    /// `ttl` given to every spawned unit.
    pub unit_ttl: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            frame_loop: LoopConfig::default(),
            spawners: 4,
            unit_ttl: 30,
        }
    }
}

impl DemoConfig {
    /// Scratch run in `directory`, wiped at open.
    #[must_use]
    pub fn ephemeral(directory: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig::ephemeral(directory),
            ..Self::default()
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Malformed TOML or invalid database settings.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.database.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Unreadable file, malformed TOML or invalid database settings.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Seeds `count` spawners on the diagonal if no spawner survived from a
/// previous run. Returns how many were created.
pub fn seed_spawners(db: &Database, count: u32, unit_ttl: u32) -> u32 {
    if !db.live_ids::<Spawner>().is_empty() {
        info!(key = Spawner::PERSIST_KEY, "Spawners restored, skipping seed");
        return 0;
    }

    for i in 0..count {
        let start = i32::try_from(i).unwrap_or(i32::MAX).saturating_mul(10);
        db.create(Spawner::new(
            Location::new(start, start),
            Location::new(1, 1),
            unit_ttl,
        ));
    }
    info!(count, unit_ttl, "Spawners seeded");
    count
}
