//! Background job scheduler for channel sweeps
//!
//! [`JobScheduler`] owns the triggers that drive the system:
//!
//! - a fixed-interval channel sweep plus a one-shot sweep shortly after start
//! - a daily cleanup of expired credentials and leftover partial files
//! - a weekly maintenance pass that reactivates recoverable channels
//!
//! A sweep loads the active channels in priority order, splits them into
//! batches of `max_concurrent_jobs`, runs each batch concurrently and pauses
//! between batches. At most one sweep runs at a time; a sweep requested while
//! another is in flight is skipped, not queued.
//!
//! # Example
//!
//! ```no_run
//! use channel_tracker::config::Config;
//! use channel_tracker::credentials::NoCredentials;
//! use channel_tracker::fetch::YtDlpProvider;
//! use channel_tracker::processor::Collaborators;
//! use channel_tracker::{Database, JobScheduler};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let db = Arc::new(Database::new(Path::new("channel-tracker.db")).await?);
//! let fetch = YtDlpProvider::from_path(config.storage.download_dir.clone())
//!     .ok_or("yt-dlp not found")?;
//!
//! let scheduler = JobScheduler::new(
//!     config,
//!     Collaborators {
//!         channels: db.clone(),
//!         downloads: db,
//!         fetch: Arc::new(fetch),
//!     },
//!     Arc::new(NoCredentials),
//! );
//! scheduler.start().await?;
//! # Ok(())
//! # }
//! ```

mod maintenance;
pub mod triggers;

pub use maintenance::{CleanupReport, MaintenanceReport};
pub use triggers::{TriggerKind, TriggerSchedule, Weekday};

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::engine::ExecutionEngine;
use crate::error::{Error, Result};
use crate::processor::{ChannelProcessor, Collaborators};
use crate::repository::prioritize;
use crate::stats::{ChannelRunStats, RunStats, SchedulerSnapshot, SchedulerStats};
use crate::types::{ChannelId, Event};
use chrono::Local;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of a [`JobScheduler::run_channel_check`] call
#[derive(Clone, Debug)]
pub enum SweepOutcome {
    /// The sweep ran to the end (or to a stop request between batches)
    Completed(RunStats),
    /// Another sweep was in flight, or the scheduler is stopped
    Skipped,
    /// The sweep could not run at all, e.g. the channel store was unreachable
    Failed(String),
}

/// Drives channel sweeps, cleanup and maintenance on their own cadences
///
/// Cheap to clone; clones share triggers, stats and the in-flight flag.
/// [`stop`](Self::stop) is final: a stopped scheduler does not start again.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    processor: ChannelProcessor,
    credentials: Arc<dyn CredentialStore>,
    sweep_in_flight: AtomicBool,
    triggers: Mutex<HashMap<TriggerKind, JoinHandle<()>>>,
    stats: RwLock<SchedulerStats>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

/// Holds the single-flight flag for the duration of a sweep
struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobScheduler {
    /// Scheduler with the default execution engine
    pub fn new(
        config: Config,
        collaborators: Collaborators,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let engine = ExecutionEngine::new(config.engine.clone(), credentials.clone());
        Self::with_engine(config, collaborators, credentials, engine)
    }

    /// Scheduler around a preconfigured engine
    ///
    /// The engine is rebound to the scheduler's cancellation token.
    pub fn with_engine(
        config: Config,
        collaborators: Collaborators,
        credentials: Arc<dyn CredentialStore>,
        engine: ExecutionEngine,
    ) -> Self {
        let cancel = CancellationToken::new();
        // Buffer up to 1000 events; slow subscribers lag rather than block sweeps
        let (event_tx, _rx) = broadcast::channel(1000);

        let processor = ChannelProcessor::new(
            collaborators,
            engine.with_cancellation(cancel.clone()),
            config.processor.clone(),
            event_tx.clone(),
            cancel.clone(),
        );

        Self {
            inner: Arc::new(Inner {
                config,
                processor,
                credentials,
                sweep_in_flight: AtomicBool::new(false),
                triggers: Mutex::new(HashMap::new()),
                stats: RwLock::new(SchedulerStats::default()),
                event_tx,
                cancel,
            }),
        }
    }

    /// Subscribe to progress events
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.event_tx.subscribe()
    }

    fn emit(&self, event: Event) {
        self.inner.event_tx.send(event).ok();
    }

    /// Register the triggers
    ///
    /// Calling `start` on a running scheduler is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::ShuttingDown`] if the scheduler has been stopped.
    pub async fn start(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let mut triggers = self.inner.triggers.lock().await;
        if !triggers.is_empty() {
            tracing::debug!("scheduler already running");
            return Ok(());
        }

        let cfg = &self.inner.config.scheduler;
        triggers.insert(
            TriggerKind::ChannelCheck,
            self.spawn_trigger(
                TriggerKind::ChannelCheck,
                TriggerSchedule::Every(cfg.check_interval),
            ),
        );
        triggers.insert(
            TriggerKind::Cleanup,
            self.spawn_trigger(
                TriggerKind::Cleanup,
                TriggerSchedule::Daily { at: cfg.cleanup_at },
            ),
        );
        triggers.insert(
            TriggerKind::Maintenance,
            self.spawn_trigger(
                TriggerKind::Maintenance,
                TriggerSchedule::Weekly {
                    day: cfg.maintenance_day,
                    at: cfg.maintenance_at,
                },
            ),
        );
        triggers.insert(
            TriggerKind::InitialCheck,
            self.spawn_initial_check(cfg.initial_delay),
        );

        tracing::info!(
            check_interval_secs = cfg.check_interval.as_secs(),
            initial_delay_secs = cfg.initial_delay.as_secs(),
            max_concurrent_jobs = cfg.max_concurrent_jobs,
            "scheduler started"
        );
        Ok(())
    }

    /// Cancel every trigger
    ///
    /// A sweep already running finishes its in-flight channel attempts and
    /// stops at the next attempt or batch boundary. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        let mut triggers = self.inner.triggers.lock().await;
        if !triggers.is_empty() {
            tracing::info!(triggers = triggers.len(), "scheduler stopped");
        }
        // trigger loops exit on cancellation; handles are only bookkeeping
        triggers.clear();
    }

    fn spawn_trigger(&self, kind: TriggerKind, schedule: TriggerSchedule) -> JoinHandle<()> {
        let scheduler = self.clone();
        let cancel = self.inner.cancel.clone();

        tokio::spawn(async move {
            loop {
                let delay = schedule.delay_from(&Local::now());
                tracing::debug!(trigger = kind.as_str(), delay_secs = delay.as_secs(), "next firing");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                // run detached so a long job does not shift the cadence
                let job = scheduler.clone();
                tokio::spawn(async move { job.fire(kind).await });
            }
            tracing::debug!(trigger = kind.as_str(), "trigger stopped");
        })
    }

    fn spawn_initial_check(&self, delay: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        let cancel = self.inner.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            scheduler
                .inner
                .triggers
                .lock()
                .await
                .remove(&TriggerKind::InitialCheck);
            scheduler.fire(TriggerKind::InitialCheck).await;
        })
    }

    async fn fire(&self, kind: TriggerKind) {
        tracing::debug!(trigger = kind.as_str(), "trigger fired");
        match kind {
            TriggerKind::ChannelCheck | TriggerKind::InitialCheck => {
                self.run_channel_check().await;
            }
            TriggerKind::Cleanup => {
                self.run_cleanup().await;
            }
            TriggerKind::Maintenance => {
                if let Err(e) = self.run_maintenance().await {
                    tracing::error!(error = %e, "weekly maintenance failed");
                }
            }
        }
    }

    /// Run one sweep over every active channel
    ///
    /// Returns [`SweepOutcome::Skipped`] immediately if a sweep is already in
    /// flight or the scheduler is stopped. Failures never escape: they are
    /// folded into the lifetime stats and reported in the outcome.
    pub async fn run_channel_check(&self) -> SweepOutcome {
        if self.inner.cancel.is_cancelled() {
            tracing::debug!("scheduler stopped, not starting sweep");
            return SweepOutcome::Skipped;
        }
        let Some(_guard) = SweepGuard::acquire(&self.inner.sweep_in_flight) else {
            tracing::info!("sweep already in progress, skipping");
            return SweepOutcome::Skipped;
        };

        let started = Instant::now();
        match self.sweep().await {
            Ok(run) => {
                let duration = started.elapsed();
                self.inner.stats.write().await.record_run(&run, duration);
                tracing::info!(
                    channels_processed = run.channels_processed,
                    items_found = run.items_found,
                    items_downloaded = run.items_downloaded,
                    errors = run.errors,
                    duration_ms = duration.as_millis() as u64,
                    "sweep completed"
                );
                self.emit(Event::SweepCompleted {
                    channels_processed: run.channels_processed,
                    items_found: run.items_found,
                    items_downloaded: run.items_downloaded,
                    errors: run.errors,
                    duration_ms: duration.as_millis() as u64,
                });
                SweepOutcome::Completed(run)
            }
            Err(e) => {
                self.inner
                    .stats
                    .write()
                    .await
                    .record_failure(started.elapsed());
                tracing::error!(error = %e, "sweep failed");
                SweepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn sweep(&self) -> Result<RunStats> {
        let mut channels = self.inner.processor.channels().find_active().await?;
        prioritize(&mut channels);

        let cfg = &self.inner.config.scheduler;
        let batches: Vec<_> = channels.chunks(cfg.max_concurrent_jobs.max(1)).collect();
        let mut run = RunStats::start();

        tracing::info!(
            channels = channels.len(),
            batches = batches.len(),
            "starting sweep"
        );
        self.emit(Event::SweepStarted {
            channels: channels.len(),
            batches: batches.len(),
        });

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = self.inner.cancel.cancelled() => {}
                    _ = tokio::time::sleep(cfg.batch_cooldown) => {}
                }
            }
            if self.inner.cancel.is_cancelled() {
                tracing::info!(
                    completed_batches = index,
                    "stop requested, ending sweep early"
                );
                break;
            }

            let channel_ids: Vec<ChannelId> = batch.iter().map(|c| c.id).collect();
            tracing::debug!(batch = index + 1, of = batches.len(), ?channel_ids, "starting batch");
            self.emit(Event::BatchStarted {
                batch: index + 1,
                of: batches.len(),
                channel_ids,
            });

            let results = join_all(
                batch
                    .iter()
                    .map(|channel| self.inner.processor.process_channel_with_retry(channel)),
            )
            .await;
            for result in &results {
                run.merge(result);
            }
        }

        Ok(run)
    }

    /// Process one channel now, outside the sweep
    ///
    /// Bypasses the single-flight flag and batching. The result is not added
    /// to the sweep statistics.
    ///
    /// # Errors
    ///
    /// [`Error::ChannelNotFound`] or [`Error::ChannelInactive`], and
    /// [`Error::ShuttingDown`] once the scheduler has been stopped.
    pub async fn check_specific_channel(&self, id: ChannelId) -> Result<ChannelRunStats> {
        if self.is_stopped() {
            return Err(Error::ShuttingDown);
        }
        let channel = self
            .inner
            .processor
            .channels()
            .find_by_id(id)
            .await?
            .ok_or(Error::ChannelNotFound(id))?;
        if !channel.is_active {
            return Err(Error::ChannelInactive(id));
        }

        tracing::info!(channel_id = %id, "manual channel check");
        Ok(self.inner.processor.process_channel_with_retry(&channel).await)
    }

    /// Lifetime counters plus the current state
    pub async fn get_stats(&self) -> SchedulerSnapshot {
        let mut triggers: Vec<TriggerKind> =
            self.inner.triggers.lock().await.keys().copied().collect();
        triggers.sort();

        SchedulerSnapshot {
            is_running: !triggers.is_empty(),
            sweep_in_flight: self.inner.sweep_in_flight.load(Ordering::SeqCst),
            triggers,
            max_concurrent_jobs: self.inner.config.scheduler.max_concurrent_jobs,
            stats: self.inner.stats.read().await.clone(),
        }
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests;
