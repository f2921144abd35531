// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::config::{AdvancedBypassConfig, CooldownConfig, EngineConfig};
use crate::credentials::NoCredentials;
use crate::engine::{CredentialPlan, IdentityPlan, Strategy};
use crate::test_helpers::{
    MemoryChannels, MemoryDownloads, ScriptedProvider, channel, channel_url,
};
use crate::types::TrackedChannel;
use chrono::Utc;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

struct Harness {
    channels: Arc<MemoryChannels>,
    downloads: Arc<MemoryDownloads>,
    fetch: Arc<ScriptedProvider>,
    scheduler: JobScheduler,
    _dirs: TempDir,
}

fn config(max_concurrent_jobs: usize, dirs: &TempDir) -> Config {
    let mut config = Config::default();
    config.scheduler.max_concurrent_jobs = max_concurrent_jobs;
    config.storage.download_dir = dirs.path().join("downloads");
    config.storage.temp_dir = dirs.path().join("temp");
    config.storage.credentials_dir = dirs.path().join("credentials");
    config.engine = EngineConfig {
        max_total_attempts: 1,
        cooldowns: CooldownConfig {
            jitter: false,
            ..CooldownConfig::default()
        },
        advanced_bypass: AdvancedBypassConfig {
            enabled: false,
            ..AdvancedBypassConfig::default()
        },
        ..EngineConfig::default()
    };
    config
}

impl Harness {
    fn new(channels: Vec<TrackedChannel>, max_concurrent_jobs: usize) -> Self {
        Self::with_fetch(channels, max_concurrent_jobs, ScriptedProvider::new())
    }

    fn with_fetch(
        channels: Vec<TrackedChannel>,
        max_concurrent_jobs: usize,
        fetch: ScriptedProvider,
    ) -> Self {
        let dirs = tempfile::tempdir().unwrap();
        let config = config(max_concurrent_jobs, &dirs);
        let channels = Arc::new(MemoryChannels::with(channels));
        let downloads = Arc::new(MemoryDownloads::default());
        let fetch = Arc::new(fetch);

        let engine = ExecutionEngine::with_strategies(
            config.engine.clone(),
            Arc::new(NoCredentials),
            vec![Strategy::new("bare", CredentialPlan::None, IdentityPlan::Bare)],
            Vec::new(),
        );
        let scheduler = JobScheduler::with_engine(
            config,
            Collaborators {
                channels: channels.clone(),
                downloads: downloads.clone(),
                fetch: fetch.clone(),
            },
            Arc::new(NoCredentials),
            engine,
        );

        Self {
            channels,
            downloads,
            fetch,
            scheduler,
            _dirs: dirs,
        }
    }
}

fn completed(outcome: SweepOutcome) -> RunStats {
    match outcome {
        SweepOutcome::Completed(run) => run,
        other => panic!("expected a completed sweep, got {other:?}"),
    }
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sweep_is_skipped() {
    let fetch = ScriptedProvider::new().with_latency(Duration::from_secs(5));
    let h = Harness::with_fetch(vec![channel(1), channel(2)], 5, fetch);
    h.fetch.listing(&channel_url(1), &[]);
    h.fetch.listing(&channel_url(2), &[]);

    let first = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move { scheduler.run_channel_check().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(h.scheduler.get_stats().await.sweep_in_flight);
    assert!(matches!(
        h.scheduler.run_channel_check().await,
        SweepOutcome::Skipped
    ));

    let run = completed(first.await.unwrap());
    assert_eq!(run.channels_processed, 2);

    // one set of writes per channel
    assert_eq!(h.channels.checked_order().len(), 2);
    assert_eq!(h.fetch.list_calls().len(), 2);

    let stats = h.scheduler.get_stats().await;
    assert!(!stats.sweep_in_flight);
    assert_eq!(stats.stats.total_runs, 1);

    // the flag is released once the sweep ends
    completed(h.scheduler.run_channel_check().await);
}

#[tokio::test(start_paused = true)]
async fn test_batches_bound_concurrency() {
    let fetch = ScriptedProvider::new().with_latency(Duration::from_secs(1));
    let channels: Vec<_> = (1..=7).map(channel).collect();
    let h = Harness::with_fetch(channels, 3, fetch);
    for id in 1..=7 {
        h.fetch.listing(&channel_url(id), &[]);
    }
    let mut events = h.scheduler.subscribe();

    let start = Instant::now();
    let run = completed(h.scheduler.run_channel_check().await);

    assert_eq!(run.channels_processed, 7);
    assert_eq!(h.fetch.peak_concurrency(), 3);
    // three 1s batches and two 10s pauses between them
    assert_eq!(start.elapsed(), Duration::from_secs(23));

    let batches: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            Event::BatchStarted {
                batch,
                of,
                channel_ids,
            } => Some((batch, of, channel_ids.len())),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![(1, 3, 3), (2, 3, 3), (3, 3, 1)]);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_visits_never_checked_then_oldest() {
    let now = Utc::now();
    let mut three_days = channel(1);
    three_days.last_checked_at = Some(now - chrono::Duration::days(3));
    let mut one_day = channel(2);
    one_day.last_checked_at = Some(now - chrono::Duration::days(1));
    let never = channel(3);

    let h = Harness::new(vec![three_days, one_day, never], 1);
    for id in 1..=3 {
        h.fetch.listing(&channel_url(id), &[]);
    }

    completed(h.scheduler.run_channel_check().await);

    assert_eq!(h.channels.checked_order(), vec![3, 1, 2]);
    assert_eq!(
        h.fetch.list_calls(),
        vec![channel_url(3), channel_url(1), channel_url(2)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_sweep_end_to_end() {
    let mut tracked = channel(1);
    tracked.last_known_item_id = Some("v2".into());
    let h = Harness::new(vec![tracked], 5);
    h.fetch.listing(&channel_url(1), &["v4", "v3", "v2"]);
    let mut events = h.scheduler.subscribe();

    let run = completed(h.scheduler.run_channel_check().await);

    assert_eq!(run.channels_processed, 1);
    assert_eq!(run.items_found, 2);
    assert_eq!(run.items_downloaded, 2);
    assert_eq!(run.errors, 0);
    assert_eq!(h.fetch.acquire_calls(), vec!["v4", "v3"]);
    assert_eq!(h.downloads.len(), 2);

    let stored = h.channels.get(1);
    assert_eq!(stored.last_known_item_id.as_deref(), Some("v4"));
    assert!(stored.last_checked_at.is_some());
    assert_eq!(stored.error_count, 0);

    let events = drain(&mut events);
    assert!(matches!(
        events.first(),
        Some(Event::SweepStarted {
            channels: 1,
            batches: 1
        })
    ));
    assert!(matches!(
        events.last(),
        Some(Event::SweepCompleted {
            channels_processed: 1,
            items_found: 2,
            items_downloaded: 2,
            errors: 0,
            ..
        })
    ));

    let stats = h.scheduler.get_stats().await.stats;
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.items_downloaded, 2);
    assert!(stats.last_run_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failing_channel_does_not_abort_batch() {
    let mut flaky = channel(1);
    flaky.error_count = 4;
    let h = Harness::new(vec![flaky, channel(2)], 5);
    h.fetch.fail_listing(&channel_url(1), 3, "HTTP Error 429: Too Many Requests");
    h.fetch.listing(&channel_url(2), &["a1"]);

    let run = completed(h.scheduler.run_channel_check().await);

    assert_eq!(run.channels_processed, 1);
    assert_eq!(run.items_downloaded, 1);
    assert_eq!(run.errors, 1);

    let deactivated = h.channels.get(1);
    assert!(!deactivated.is_active);
    assert_eq!(deactivated.error_count, 5);

    let stats = h.scheduler.get_stats().await.stats;
    assert_eq!(stats.failed_runs, 1);
    assert_eq!(stats.successful_runs, 0);

    // the deactivated channel is left out of the next sweep
    let calls_before = h.fetch.list_calls().len();
    completed(h.scheduler.run_channel_check().await);
    let calls = h.fetch.list_calls();
    assert_eq!(calls[calls_before..].to_vec(), vec![channel_url(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_failure_is_counted_not_raised() {
    let h = Harness::new(vec![channel(1)], 5);
    h.channels.fail_queries.store(true, Ordering::SeqCst);

    let outcome = h.scheduler.run_channel_check().await;
    assert!(matches!(outcome, SweepOutcome::Failed(msg) if msg.contains("unavailable")));

    let stats = h.scheduler.get_stats().await.stats;
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.failed_runs, 1);
    assert!(stats.last_run.is_none());

    // the next sweep runs normally
    h.channels.fail_queries.store(false, Ordering::SeqCst);
    h.fetch.listing(&channel_url(1), &[]);
    completed(h.scheduler.run_channel_check().await);
    assert_eq!(h.scheduler.get_stats().await.stats.total_runs, 2);
}

#[tokio::test(start_paused = true)]
async fn test_check_specific_channel() {
    let mut inactive = channel(2);
    inactive.is_active = false;
    let h = Harness::new(vec![channel(1), inactive], 5);
    h.fetch.listing(&channel_url(1), &["x1"]);

    let stats = h
        .scheduler
        .check_specific_channel(ChannelId(1))
        .await
        .unwrap();
    assert!(stats.succeeded);
    assert_eq!(stats.items_downloaded, 1);

    assert!(matches!(
        h.scheduler.check_specific_channel(ChannelId(2)).await,
        Err(Error::ChannelInactive(id)) if id == ChannelId(2)
    ));
    assert!(matches!(
        h.scheduler.check_specific_channel(ChannelId(99)).await,
        Err(Error::ChannelNotFound(id)) if id == ChannelId(99)
    ));

    // manual checks are not sweeps
    assert_eq!(h.scheduler.get_stats().await.stats.total_runs, 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_and_stop_are_idempotent() {
    let h = Harness::new(vec![], 5);

    h.scheduler.start().await.unwrap();
    h.scheduler.start().await.unwrap();

    let snapshot = h.scheduler.get_stats().await;
    assert!(snapshot.is_running);
    assert_eq!(
        snapshot.triggers,
        vec![
            TriggerKind::ChannelCheck,
            TriggerKind::InitialCheck,
            TriggerKind::Cleanup,
            TriggerKind::Maintenance,
        ]
    );
    assert_eq!(snapshot.max_concurrent_jobs, 5);

    h.scheduler.stop().await;
    h.scheduler.stop().await;

    let snapshot = h.scheduler.get_stats().await;
    assert!(!snapshot.is_running);
    assert!(snapshot.triggers.is_empty());
    assert!(h.scheduler.is_stopped());

    assert!(matches!(h.scheduler.start().await, Err(Error::ShuttingDown)));
    assert!(matches!(
        h.scheduler.run_channel_check().await,
        SweepOutcome::Skipped
    ));
}

#[tokio::test(start_paused = true)]
async fn test_check_specific_channel_after_stop_fails() {
    let h = Harness::new(vec![channel(1)], 5);
    h.fetch.listing(&channel_url(1), &["x1"]);

    h.scheduler.stop().await;

    assert!(matches!(
        h.scheduler.check_specific_channel(ChannelId(1)).await,
        Err(Error::ShuttingDown)
    ));
    assert!(h.fetch.list_calls().is_empty());
    assert!(h.channels.writes_for(1).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_triggers_fire_on_schedule() {
    let h = Harness::new(vec![channel(1)], 5);
    h.fetch.listing(&channel_url(1), &[]);

    h.scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(119)).await;
    assert!(h.fetch.list_calls().is_empty());

    // initial sweep after 120s, then it drops out of the registry
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.fetch.list_calls().len(), 1);
    assert!(
        !h.scheduler
            .get_stats()
            .await
            .triggers
            .contains(&TriggerKind::InitialCheck)
    );

    // interval sweep at 900s
    tokio::time::sleep(Duration::from_secs(780)).await;
    assert_eq!(h.fetch.list_calls().len(), 2);

    h.scheduler.stop().await;
    tokio::time::sleep(Duration::from_secs(1800)).await;
    assert_eq!(h.fetch.list_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_sweep_between_batches() {
    let fetch = ScriptedProvider::new().with_latency(Duration::from_secs(1));
    let h = Harness::with_fetch(vec![channel(1), channel(2)], 1, fetch);
    h.fetch.listing(&channel_url(1), &[]);
    h.fetch.listing(&channel_url(2), &[]);

    let sweep = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move { scheduler.run_channel_check().await })
    };
    // first batch done, now in the inter-batch pause
    tokio::time::sleep(Duration::from_secs(3)).await;
    h.scheduler.stop().await;

    let run = completed(sweep.await.unwrap());
    assert_eq!(run.channels_processed, 1);
    assert_eq!(h.fetch.list_calls(), vec![channel_url(1)]);
}

#[tokio::test]
async fn test_maintenance_reactivates_below_threshold() {
    let mut recoverable = channel(1);
    recoverable.is_active = false;
    recoverable.error_count = 5;
    recoverable.last_error = Some("HTTP Error 429".into());
    let mut hopeless = channel(2);
    hopeless.is_active = false;
    hopeless.error_count = 12;
    let h = Harness::new(vec![recoverable, hopeless, channel(3)], 5);
    let mut events = h.scheduler.subscribe();

    let report = h.scheduler.run_maintenance().await.unwrap();

    assert_eq!(report.reactivated, vec![ChannelId(1)]);
    assert_eq!(report.invalid_credentials, 0);

    let reactivated = h.channels.get(1);
    assert!(reactivated.is_active);
    assert_eq!(reactivated.error_count, 0);
    assert!(reactivated.last_error.is_none());
    assert!(!h.channels.get(2).is_active);

    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        Event::MaintenanceCompleted { reactivated, .. } if reactivated == &[ChannelId(1)]
    )));
}

#[tokio::test]
async fn test_cleanup_removes_partial_downloads() {
    let dirs = tempfile::tempdir().unwrap();
    let mut config = config(5, &dirs);
    config.storage.temp_file_max_age = Duration::ZERO;
    std::fs::create_dir_all(&config.storage.download_dir).unwrap();
    std::fs::create_dir_all(&config.storage.temp_dir).unwrap();
    std::fs::write(config.storage.download_dir.join("a.mp4.part"), b"x").unwrap();
    std::fs::write(config.storage.download_dir.join("done.mp4"), b"x").unwrap();
    std::fs::write(config.storage.temp_dir.join("b.ytdl"), b"x").unwrap();

    let scheduler = JobScheduler::new(
        config.clone(),
        Collaborators {
            channels: Arc::new(MemoryChannels::default()),
            downloads: Arc::new(MemoryDownloads::default()),
            fetch: Arc::new(ScriptedProvider::new()),
        },
        Arc::new(NoCredentials),
    );

    let report = scheduler.run_cleanup().await;

    assert_eq!(report.temp_files, 2);
    assert_eq!(report.expired_credentials, 0);
    assert!(config.storage.download_dir.join("done.mp4").exists());
    assert!(!config.storage.download_dir.join("a.mp4.part").exists());
}
