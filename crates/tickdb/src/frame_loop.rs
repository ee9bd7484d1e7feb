//! # Frame Loop
//!
//! Drives a [`Database`] at a fixed tick rate:
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. UPDATE TICK                                                      │
//! │    ├─ Workers run every on_update against frame N-1                 │
//! │    └─ Queued creates/destroys applied                               │
//! │                                                                     │
//! │ 2. END FRAME                                                        │
//! │    ├─ Swap working/committed buffers                                │
//! │    └─ Rebuild and publish indices                                   │
//! │                                                                     │
//! │ 3. PACE                                                             │
//! │    └─ Sleep out the rest of the frame budget                        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tickdb_core::{Database, DatabaseResult};
use tracing::{info, warn};

/// Default ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Configuration for the frame loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Target ticks per second.
    pub tick_rate: u32,
    /// Frames to run before returning.
    pub frames: u64,
    /// Sleep out the remainder of each frame budget.
    pub pace: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            frames: 600,
            pace: true,
        }
    }
}

impl LoopConfig {
    /// Time allotted to one frame.
    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate.max(1)))
    }
}

/// Timing and work of one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    /// Frame number the tick ran against.
    pub frame: u64,
    /// Whole frame in microseconds, excluding pacing.
    pub total_us: u64,
    /// `update_tick` in microseconds.
    pub tick_us: u64,
    /// `end_frame` in microseconds.
    pub end_us: u64,
    /// Objects updated.
    pub updated: usize,
    /// Creates applied.
    pub creates: usize,
    /// Destroys applied.
    pub destroys: usize,
}

/// Runs frames against a borrowed database.
pub struct FrameLoop<'a> {
    db: &'a Database,
    config: LoopConfig,
    budget: Duration,
    stats: FrameStatsAccumulator,
}

impl<'a> FrameLoop<'a> {
    /// Creates a loop over `db`.
    #[must_use]
    pub fn new(db: &'a Database, config: LoopConfig) -> Self {
        let budget = config.frame_budget();
        Self {
            db,
            config,
            budget,
            stats: FrameStatsAccumulator::new(budget),
        }
    }

    /// Runs one update/end cycle without pacing.
    ///
    /// # Errors
    ///
    /// Whatever [`Database::update_tick`] or [`Database::end_frame`] returns.
    pub fn run_frame(&mut self) -> DatabaseResult<FrameStats> {
        let start = Instant::now();
        let tick = self.db.update_tick()?;
        let tick_us = elapsed_us(start);

        let end_start = Instant::now();
        self.db.end_frame()?;
        let end_us = elapsed_us(end_start);

        let stats = FrameStats {
            frame: tick.frame,
            total_us: elapsed_us(start),
            tick_us,
            end_us,
            updated: tick.updated,
            creates: tick.creates,
            destroys: tick.destroys,
        };
        self.stats.record(stats);

        if stats.total_us > duration_us(self.budget) {
            warn!(
                frame = stats.frame,
                total_us = stats.total_us,
                budget_us = duration_us(self.budget),
                "Frame exceeded budget"
            );
        }
        Ok(stats)
    }

    /// Runs the configured number of frames, pacing to the tick rate.
    ///
    /// # Errors
    ///
    /// Stops at the first failed frame.
    pub fn run(&mut self) -> DatabaseResult<&FrameStatsAccumulator> {
        for _ in 0..self.config.frames {
            let start = Instant::now();
            self.run_frame()?;
            if self.config.pace {
                if let Some(rest) = self.budget.checked_sub(start.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }
        Ok(&self.stats)
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }
}

/// Accumulator for frame statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Total frames recorded.
    pub frames_recorded: u64,
    /// Sum of total frame times.
    pub total_us_sum: u64,
    /// Sum of update tick times.
    pub tick_us_sum: u64,
    /// Sum of end-of-frame times.
    pub end_us_sum: u64,
    /// Min frame time.
    pub min_frame_us: u64,
    /// Max frame time.
    pub max_frame_us: u64,
    /// Frames that exceeded budget.
    pub frames_over_budget: u64,
    /// Creates applied across all frames.
    pub creates: u64,
    /// Destroys applied across all frames.
    pub destroys: u64,
    budget_us: u64,
}

impl FrameStatsAccumulator {
    /// Creates an accumulator measuring against `budget`.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            tick_us_sum: 0,
            end_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            creates: 0,
            destroys: 0,
            budget_us: duration_us(budget),
        }
    }

    /// Records a frame's statistics.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_recorded += 1;
        self.total_us_sum += stats.total_us;
        self.tick_us_sum += stats.tick_us;
        self.end_us_sum += stats.end_us;
        self.min_frame_us = self.min_frame_us.min(stats.total_us);
        self.max_frame_us = self.max_frame_us.max(stats.total_us);
        self.creates += stats.creates as u64;
        self.destroys += stats.destroys as u64;

        if stats.total_us > self.budget_us {
            self.frames_over_budget += 1;
        }
    }

    /// Returns average frame time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Returns the share of frames over budget.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }

    /// Logs a summary at `info`.
    #[allow(clippy::cast_precision_loss)]
    pub fn log_summary(&self) {
        let per_frame = |sum: u64| {
            if self.frames_recorded == 0 {
                0.0
            } else {
                (sum as f64 / self.frames_recorded as f64) / 1000.0
            }
        };
        info!(
            frames = self.frames_recorded,
            avg_frame_ms = self.avg_frame_ms(),
            avg_tick_ms = per_frame(self.tick_us_sum),
            avg_end_ms = per_frame(self.end_us_sum),
            min_frame_us = if self.frames_recorded == 0 { 0 } else { self.min_frame_us },
            max_frame_us = self.max_frame_us,
            over_budget = self.frames_over_budget,
            creates = self.creates,
            destroys = self.destroys,
            "Frame statistics"
        );
    }
}

fn elapsed_us(since: Instant) -> u64 {
    duration_us(since.elapsed())
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_budget() {
        let config = LoopConfig {
            tick_rate: 50,
            ..LoopConfig::default()
        };
        assert_eq!(config.frame_budget(), Duration::from_millis(20));

        let zero = LoopConfig {
            tick_rate: 0,
            ..LoopConfig::default()
        };
        assert_eq!(zero.frame_budget(), Duration::from_secs(1));
    }

    #[test]
    fn test_accumulator_records() {
        let mut acc = FrameStatsAccumulator::new(Duration::from_millis(1));
        acc.record(FrameStats {
            total_us: 500,
            creates: 2,
            ..FrameStats::default()
        });
        acc.record(FrameStats {
            total_us: 1_500,
            destroys: 1,
            ..FrameStats::default()
        });

        assert_eq!(acc.frames_recorded, 2);
        assert_eq!(acc.min_frame_us, 500);
        assert_eq!(acc.max_frame_us, 1_500);
        assert_eq!(acc.frames_over_budget, 1);
        assert_eq!(acc.creates, 2);
        assert_eq!(acc.destroys, 1);
        assert!((acc.avg_frame_ms() - 1.0).abs() < f64::EPSILON);
        assert!((acc.over_budget_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = FrameStatsAccumulator::new(Duration::from_millis(16));
        assert!(acc.avg_frame_ms().abs() < f64::EPSILON);
        assert!(acc.over_budget_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn test_loop_config_from_toml() {
        let config: LoopConfig = toml::from_str("tick_rate = 30\npace = false").unwrap();
        assert_eq!(config.tick_rate, 30);
        assert!(!config.pace);
        assert_eq!(config.frames, LoopConfig::default().frames);
    }
}
