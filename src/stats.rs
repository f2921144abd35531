//! Sweep and lifetime statistics
//!
//! A sweep builds one [`RunStats`] from the [`ChannelRunStats`] each channel
//! task returns, so there are no counters shared between concurrent channel
//! tasks. The finished run is folded into the scheduler-owned
//! [`SchedulerStats`].

use crate::scheduler::TriggerKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one channel pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRunStats {
    /// New items found (not already recorded)
    pub items_found: u64,
    /// Items acquired and recorded
    pub items_downloaded: u64,
    /// Errors counted during the pass (item failures, or the channel failure)
    pub errors: u64,
    /// Whether the channel pass itself succeeded
    pub succeeded: bool,
}

impl ChannelRunStats {
    /// Stats for a channel whose every attempt failed
    pub fn failed() -> Self {
        Self {
            errors: 1,
            ..Self::default()
        }
    }
}

/// Counters for one sweep
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunStats {
    /// Channels whose pass succeeded
    pub channels_processed: u64,
    /// New items found
    pub items_found: u64,
    /// Items acquired
    pub items_downloaded: u64,
    /// Errors counted
    pub errors: u64,
    /// When the sweep started
    pub started_at: DateTime<Utc>,
}

impl RunStats {
    /// Empty stats for a sweep starting now
    pub fn start() -> Self {
        Self {
            channels_processed: 0,
            items_found: 0,
            items_downloaded: 0,
            errors: 0,
            started_at: Utc::now(),
        }
    }

    /// Fold one channel's outcome into the sweep
    pub fn merge(&mut self, channel: &ChannelRunStats) {
        if channel.succeeded {
            self.channels_processed += 1;
        }
        self.items_found += channel.items_found;
        self.items_downloaded += channel.items_downloaded;
        self.errors += channel.errors;
    }

    /// A sweep is successful iff it counted no errors
    pub fn is_successful(&self) -> bool {
        self.errors == 0
    }
}

/// Lifetime counters owned by one scheduler instance
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Sweeps completed (including ones that failed as a whole)
    pub total_runs: u64,
    /// Sweeps with zero errors
    pub successful_runs: u64,
    /// Sweeps with at least one error
    pub failed_runs: u64,
    /// Channels processed over all sweeps
    pub channels_processed: u64,
    /// Items found over all sweeps
    pub items_found: u64,
    /// Items acquired over all sweeps
    pub items_downloaded: u64,
    /// Rolling mean sweep duration in seconds
    pub average_run_secs: f64,
    /// When the last sweep finished
    pub last_run_at: Option<DateTime<Utc>>,
    /// The last sweep's stats
    pub last_run: Option<RunStats>,
}

impl SchedulerStats {
    /// Record a finished sweep
    pub fn record_run(&mut self, run: &RunStats, duration: Duration) {
        self.total_runs += 1;
        if run.is_successful() {
            self.successful_runs += 1;
        } else {
            self.failed_runs += 1;
        }
        self.channels_processed += run.channels_processed;
        self.items_found += run.items_found;
        self.items_downloaded += run.items_downloaded;
        self.update_average(duration);
        self.last_run_at = Some(Utc::now());
        self.last_run = Some(run.clone());
    }

    /// Record a sweep that failed before producing per-channel results
    pub fn record_failure(&mut self, duration: Duration) {
        self.total_runs += 1;
        self.failed_runs += 1;
        self.update_average(duration);
        self.last_run_at = Some(Utc::now());
    }

    fn update_average(&mut self, duration: Duration) {
        let n = self.total_runs as f64;
        self.average_run_secs = (self.average_run_secs * (n - 1.0) + duration.as_secs_f64()) / n;
    }
}

/// Point-in-time view returned by `get_stats`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Whether the triggers are registered
    pub is_running: bool,
    /// Whether a sweep is executing right now
    pub sweep_in_flight: bool,
    /// Registered triggers
    pub triggers: Vec<TriggerKind>,
    /// Per-sweep concurrency bound
    pub max_concurrent_jobs: usize,
    /// Lifetime counters
    pub stats: SchedulerStats,
}
