//! # TICKDB Demo
//!
//! Headless run of the spawner simulation.
//!
//! ```bash
//! # Scratch run in the system temp directory
//! ./tickdb_demo
//!
//! # Persistent run; state survives restarts
//! ./tickdb_demo demo.toml
//!
//! # Per-tick detail
//! RUST_LOG=tickdb_core=debug ./tickdb_demo demo.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use tickdb::{
    register_simulation, seed_spawners, DemoConfig, FrameLoop, Location, Spawner, Unit, UnitByLocation,
};
use tickdb::db::{Database, DatabaseResult, Registry};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Demo failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> DatabaseResult<()> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            DemoConfig::from_file(&path)?
        }
        None => DemoConfig::ephemeral(std::env::temp_dir().join("tickdb_demo")),
    };

    let mut registry = Registry::new();
    register_simulation(&mut registry)?;
    let db = Database::open(config.database.clone(), registry)?;
    info!(
        path = %db.storage_path().display(),
        workers = db.workers(),
        work_unit_size = db.config().work_unit_size,
        tick_rate = config.frame_loop.tick_rate,
        "Demo starting"
    );
    seed_spawners(&db, config.spawners, config.unit_ttl);

    let mut frame_loop = FrameLoop::new(&db, config.frame_loop.clone());
    frame_loop.run()?.log_summary();

    let origin = Location::new(0, 0);
    let mut units_at_origin = 0;
    db.foreach_by_idx::<UnitByLocation>(&origin, |_| units_at_origin += 1);
    info!(
        frame = db.frame(),
        spawners = db.live_ids::<Spawner>().len(),
        units = db.store_stats::<Unit>().live,
        units_at_origin,
        "Simulation finished"
    );

    for report in db.graceful_shutdown()? {
        info!(key = %report.key, records = report.records, bytes = report.bytes, "Flushed");
    }
    Ok(())
}
