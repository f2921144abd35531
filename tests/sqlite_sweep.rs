//! Full sweeps against the SQLite repositories
//!
//! The fetch provider is faked; everything else (scheduler, processor,
//! engine, database) is the real implementation.

mod common;

use channel_tracker::config::Config;
use channel_tracker::credentials::NoCredentials;
use channel_tracker::engine::{CredentialPlan, ExecutionEngine, IdentityPlan, Strategy};
use channel_tracker::processor::Collaborators;
use channel_tracker::repository::{ChannelRepository, DownloadRepository};
use channel_tracker::{
    Database, DownloadSource, JobScheduler, NewTrackedChannel, SweepOutcome, TrackedChannel,
};
use common::FakeProvider;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Setup {
    db: Arc<Database>,
    fetch: Arc<FakeProvider>,
    scheduler: JobScheduler,
    _dir: TempDir,
}

async fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.storage.download_dir = dir.path().join("downloads");
    config.storage.temp_dir = dir.path().join("temp");
    config.processor.retry_delay = Duration::from_millis(1);
    config.processor.item_delay = Duration::ZERO;
    config.scheduler.batch_cooldown = Duration::from_millis(1);
    config.engine.max_total_attempts = 1;
    config.engine.advanced_bypass.enabled = false;
    config.engine.cooldowns.jitter = false;

    let db = Arc::new(Database::new(&dir.path().join("tracker.db")).await.unwrap());
    let fetch = Arc::new(FakeProvider::default());

    let engine = ExecutionEngine::with_strategies(
        config.engine.clone(),
        Arc::new(NoCredentials),
        vec![Strategy::new("bare", CredentialPlan::None, IdentityPlan::Bare)],
        Vec::new(),
    );

    let scheduler = JobScheduler::with_engine(
        config,
        Collaborators {
            channels: db.clone(),
            downloads: db.clone(),
            fetch: fetch.clone(),
        },
        Arc::new(NoCredentials),
        engine,
    );

    Setup {
        db,
        fetch,
        scheduler,
        _dir: dir,
    }
}

async fn register(db: &Database, source_id: &str) -> TrackedChannel {
    ChannelRepository::create(
        db,
        NewTrackedChannel {
            source_channel_id: source_id.to_string(),
            source_url: format!("https://example.com/channel/{source_id}"),
            display_name: source_id.to_string(),
            user_id: 7,
            quality: "720p".into(),
            save_to_library: true,
            scheduled_hour: 6,
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_sweep_records_new_items() {
    let s = setup().await;
    let channel = register(&s.db, "UCone").await;
    s.fetch.set_listing(&channel.source_url, &["c", "b", "a"]);

    let SweepOutcome::Completed(run) = s.scheduler.run_channel_check().await else {
        panic!("sweep did not complete");
    };
    assert_eq!(run.items_found, 3);
    assert_eq!(run.items_downloaded, 3);

    let record = s.db.find_by_source_id("c").await.unwrap().unwrap();
    assert_eq!(record.source, DownloadSource::AutoChannel);
    assert_eq!(record.channel_id, Some(channel.id));
    assert_eq!(record.channel_name.as_deref(), Some("UCone"));
    assert_eq!(record.quality, "720p");
    assert_eq!(record.format, "webm");
    assert_eq!(record.user_id, 7);

    let stored = s.db.find_by_id(channel.id).await.unwrap().unwrap();
    assert_eq!(stored.last_known_item_id.as_deref(), Some("c"));
    assert_eq!(stored.total_items_found, 3);
    assert_eq!(stored.total_items_downloaded, 3);
    assert!(stored.last_checked_at.is_some());

    // a newer item shows up; only it is acquired
    s.fetch.set_listing(&channel.source_url, &["d", "c", "b"]);
    let SweepOutcome::Completed(run) = s.scheduler.run_channel_check().await else {
        panic!("sweep did not complete");
    };
    assert_eq!(run.items_downloaded, 1);
    assert_eq!(s.fetch.acquired(), vec!["c", "b", "a", "d"]);
    assert_eq!(s.db.list_downloads_for_channel(channel.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_repeated_failures_deactivate_then_maintenance_restores() {
    let s = setup().await;
    let broken = register(&s.db, "UCbroken").await;
    let healthy = register(&s.db, "UChealthy").await;
    s.fetch.fail_channel(&broken.source_url);
    s.fetch.set_listing(&healthy.source_url, &[]);

    for _ in 0..5 {
        s.scheduler.run_channel_check().await;
    }

    let stored = s.db.find_by_id(broken.id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert_eq!(stored.error_count, 5);
    assert!(stored.last_error.unwrap().contains("429"));

    let active: Vec<_> = s
        .db
        .find_active()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(active, vec![healthy.id]);

    let stats = s.scheduler.get_stats().await.stats;
    assert_eq!(stats.total_runs, 5);
    assert_eq!(stats.failed_runs, 5);

    let report = s.scheduler.run_maintenance().await.unwrap();
    assert_eq!(report.reactivated, vec![broken.id]);

    let restored = s.db.find_by_id(broken.id).await.unwrap().unwrap();
    assert!(restored.is_active);
    assert_eq!(restored.error_count, 0);
}

#[tokio::test]
async fn test_manual_download_is_not_fetched_again() {
    let s = setup().await;
    let channel = register(&s.db, "UCone").await;
    s.fetch.set_listing(&channel.source_url, &["b", "a"]);

    DownloadRepository::create(
        &*s.db,
        channel_tracker::types::NewDownloadRecord {
            source_item_id: "b".into(),
            title: "Item b".into(),
            channel_id: None,
            channel_name: None,
            original_url: "https://example.com/watch?v=b".into(),
            quality: "best".into(),
            format: "mp4".into(),
            file_path: "/media/manual/b.mp4".into(),
            thumbnail_path: None,
            metadata_path: None,
            file_size_bytes: None,
            duration_seconds: None,
            user_id: 7,
            source: DownloadSource::Manual,
        },
    )
    .await
    .unwrap();

    s.scheduler.check_specific_channel(channel.id).await.unwrap();

    assert_eq!(s.fetch.acquired(), vec!["a"]);
    let manual = s.db.find_by_source_id("b").await.unwrap().unwrap();
    assert_eq!(manual.source, DownloadSource::Manual);
}
