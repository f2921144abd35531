//! Shared test doubles: in-memory repositories and a scripted fetch provider.

use crate::engine::InvocationDescriptor;
use crate::error::{Error, Result};
use crate::fetch::FetchProvider;
use crate::repository::{ChannelRepository, DownloadRepository, prioritize};
use crate::types::{
    AcquiredItem, ChannelId, DownloadRecord, ItemSummary, NewDownloadRecord, NewTrackedChannel,
    TrackedChannel,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

/// Fixed registration time so ordering tests are deterministic
pub(crate) fn registered_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// An active, never-checked channel with id `id`
pub(crate) fn channel(id: i64) -> TrackedChannel {
    TrackedChannel {
        id: ChannelId(id),
        source_channel_id: format!("UC{id}"),
        source_url: channel_url(id),
        display_name: format!("Channel {id}"),
        user_id: 1,
        is_active: true,
        quality: "best".into(),
        save_to_library: true,
        scheduled_hour: 0,
        last_checked_at: None,
        last_known_item_id: None,
        total_items_found: 0,
        total_items_downloaded: 0,
        error_count: 0,
        last_error: None,
        created_at: registered_at(),
    }
}

pub(crate) fn channel_url(id: i64) -> String {
    format!("https://example.com/channel/UC{id}")
}

/// Registration data for a channel with external id `source_id`
pub(crate) fn new_channel(source_id: &str) -> NewTrackedChannel {
    NewTrackedChannel {
        source_channel_id: source_id.to_string(),
        source_url: format!("https://example.com/channel/{source_id}"),
        display_name: format!("Channel {source_id}"),
        user_id: 1,
        quality: "best".into(),
        save_to_library: true,
        scheduled_hour: 8,
    }
}

pub(crate) fn item_url(id: &str) -> String {
    format!("https://example.com/watch?v={id}")
}

/// Listing entry for item `id`
pub(crate) fn item(id: &str) -> ItemSummary {
    ItemSummary {
        id: id.to_string(),
        title: format!("Item {id}"),
        url: item_url(id),
        duration_seconds: Some(60.0),
        upload_date: None,
        view_count: None,
    }
}

/// A manual download record for `id`
pub(crate) fn new_download(id: &str, channel_id: Option<ChannelId>) -> NewDownloadRecord {
    NewDownloadRecord {
        source_item_id: id.to_string(),
        title: format!("Item {id}"),
        channel_id,
        channel_name: None,
        original_url: item_url(id),
        quality: "best".into(),
        format: "mp4".into(),
        file_path: PathBuf::from(format!("/media/{id}.mp4")),
        thumbnail_path: None,
        metadata_path: None,
        file_size_bytes: Some(1024),
        duration_seconds: Some(60.0),
        user_id: 1,
        source: crate::types::DownloadSource::Manual,
    }
}

/// In-memory [`ChannelRepository`] that logs every write
#[derive(Default)]
pub(crate) struct MemoryChannels {
    channels: Mutex<BTreeMap<ChannelId, TrackedChannel>>,
    writes: Mutex<Vec<(ChannelId, &'static str)>>,
    /// When set, `find_active` fails as if the store were down
    pub(crate) fail_queries: AtomicBool,
    next_id: AtomicI64,
}

impl MemoryChannels {
    pub(crate) fn with(channels: Vec<TrackedChannel>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.channels.lock().unwrap();
            for c in channels {
                repo.next_id.fetch_max(c.id.get(), Ordering::SeqCst);
                map.insert(c.id, c);
            }
        }
        repo
    }

    pub(crate) fn get(&self, id: i64) -> TrackedChannel {
        self.channels.lock().unwrap()[&ChannelId(id)].clone()
    }

    /// Writes recorded for one channel, in order
    pub(crate) fn writes_for(&self, id: i64) -> Vec<&'static str> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c.get() == id)
            .map(|(_, w)| *w)
            .collect()
    }

    /// Channel ids in the order `mark_checked` was called
    pub(crate) fn checked_order(&self) -> Vec<i64> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, w)| *w == "mark_checked")
            .map(|(c, _)| c.get())
            .collect()
    }

    fn update<F: FnOnce(&mut TrackedChannel)>(
        &self,
        id: ChannelId,
        write: &'static str,
        f: F,
    ) -> Result<()> {
        let mut map = self.channels.lock().unwrap();
        let channel = map.get_mut(&id).ok_or(Error::ChannelNotFound(id))?;
        f(channel);
        self.writes.lock().unwrap().push((id, write));
        Ok(())
    }
}

#[async_trait]
impl ChannelRepository for MemoryChannels {
    async fn find_active(&self) -> Result<Vec<TrackedChannel>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::Other("channel store unavailable".into()));
        }
        let mut active: Vec<_> = self
            .channels
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        prioritize(&mut active);
        Ok(active)
    }

    async fn find_inactive(&self) -> Result<Vec<TrackedChannel>> {
        let mut inactive: Vec<_> = self
            .channels
            .lock()
            .unwrap()
            .values()
            .filter(|c| !c.is_active)
            .cloned()
            .collect();
        prioritize(&mut inactive);
        Ok(inactive)
    }

    async fn find_by_id(&self, id: ChannelId) -> Result<Option<TrackedChannel>> {
        Ok(self.channels.lock().unwrap().get(&id).cloned())
    }

    async fn create(&self, new: NewTrackedChannel) -> Result<TrackedChannel> {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut created = channel(id.get());
        created.source_channel_id = new.source_channel_id;
        created.source_url = new.source_url;
        created.display_name = new.display_name;
        created.user_id = new.user_id;
        created.quality = new.quality;
        created.save_to_library = new.save_to_library;
        created.scheduled_hour = new.scheduled_hour;
        self.channels.lock().unwrap().insert(id, created.clone());
        Ok(created)
    }

    async fn save(&self, channel: &TrackedChannel) -> Result<()> {
        let updated = channel.clone();
        self.update(channel.id, "save", |c| *c = updated)
    }

    async fn increment_error(
        &self,
        id: ChannelId,
        message: &str,
        threshold: u32,
    ) -> Result<TrackedChannel> {
        self.update(id, "increment_error", |c| {
            c.error_count += 1;
            c.last_error = Some(message.to_string());
            if c.error_count >= threshold {
                c.is_active = false;
            }
        })?;
        self.find_by_id(id).await?.ok_or(Error::ChannelNotFound(id))
    }

    async fn reset_errors(&self, id: ChannelId) -> Result<()> {
        self.update(id, "reset_errors", |c| {
            c.error_count = 0;
            c.last_error = None;
        })
    }

    async fn reactivate(&self, id: ChannelId) -> Result<()> {
        self.update(id, "reactivate", |c| {
            c.is_active = true;
            c.error_count = 0;
            c.last_error = None;
        })
    }

    async fn record_item_found(&self, id: ChannelId) -> Result<()> {
        self.update(id, "record_item_found", |c| c.total_items_found += 1)
    }

    async fn record_item_downloaded(&self, id: ChannelId) -> Result<()> {
        self.update(id, "record_item_downloaded", |c| {
            c.total_items_downloaded += 1
        })
    }

    async fn set_last_known_item(&self, id: ChannelId, item_id: &str) -> Result<()> {
        self.update(id, "set_last_known_item", |c| {
            c.last_known_item_id = Some(item_id.to_string())
        })
    }

    async fn mark_checked(&self, id: ChannelId, at: DateTime<Utc>) -> Result<()> {
        self.update(id, "mark_checked", |c| c.last_checked_at = Some(at))
    }
}

/// In-memory [`DownloadRepository`]
#[derive(Default)]
pub(crate) struct MemoryDownloads {
    records: Mutex<HashMap<String, DownloadRecord>>,
    /// When set, `find_by_source_id` fails as if the store were down
    pub(crate) fail_lookups: AtomicBool,
    next_id: AtomicI64,
}

impl MemoryDownloads {
    pub(crate) fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.records.lock().unwrap().contains_key(id)
    }
}

#[async_trait]
impl DownloadRepository for MemoryDownloads {
    async fn find_by_source_id(&self, source_item_id: &str) -> Result<Option<DownloadRecord>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::Other("download store unavailable".into()));
        }
        Ok(self.records.lock().unwrap().get(source_item_id).cloned())
    }

    async fn create(&self, new: NewDownloadRecord) -> Result<DownloadRecord> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&new.source_item_id) {
            return Err(Error::Duplicate(new.source_item_id));
        }
        let record = DownloadRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            source_item_id: new.source_item_id,
            title: new.title,
            channel_id: new.channel_id,
            channel_name: new.channel_name,
            original_url: new.original_url,
            quality: new.quality,
            format: new.format,
            file_path: new.file_path,
            thumbnail_path: new.thumbnail_path,
            metadata_path: new.metadata_path,
            file_size_bytes: new.file_size_bytes,
            duration_seconds: new.duration_seconds,
            user_id: new.user_id,
            source: new.source,
            created_at: Utc::now(),
        };
        records.insert(record.source_item_id.clone(), record.clone());
        Ok(record)
    }
}

/// Listing behaviour for one channel URL
#[derive(Clone, Default)]
struct ListingScript {
    items: Vec<ItemSummary>,
    failures_remaining: u32,
    error: String,
}

/// Fetch provider answering from scripts, recording calls and peak concurrency
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    listings: Mutex<HashMap<String, ListingScript>>,
    failing_items: Mutex<HashMap<String, String>>,
    list_calls: Mutex<Vec<String>>,
    acquire_calls: Mutex<Vec<String>>,
    descriptors: Mutex<Vec<InvocationDescriptor>>,
    /// Simulated duration of every call
    pub(crate) latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    /// Channel at `url` lists these item ids, newest first
    pub(crate) fn listing(&self, url: &str, ids: &[&str]) {
        self.listings.lock().unwrap().insert(
            url.to_string(),
            ListingScript {
                items: ids.iter().map(|id| item(id)).collect(),
                ..ListingScript::default()
            },
        );
    }

    /// The next `times` listings of `url` fail with `error`
    pub(crate) fn fail_listing(&self, url: &str, times: u32, error: &str) {
        let mut listings = self.listings.lock().unwrap();
        let script = listings.entry(url.to_string()).or_default();
        script.failures_remaining = times;
        script.error = error.to_string();
    }

    /// Acquiring item `id` always fails with `error`
    pub(crate) fn fail_item(&self, id: &str, error: &str) {
        self.failing_items
            .lock()
            .unwrap()
            .insert(id.to_string(), error.to_string());
    }

    /// Let a previously failing item succeed from now on
    pub(crate) fn restore_item(&self, id: &str) {
        self.failing_items.lock().unwrap().remove(id);
    }

    pub(crate) fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    /// Item ids passed to `acquire_item`, in call order
    pub(crate) fn acquire_calls(&self) -> Vec<String> {
        self.acquire_calls.lock().unwrap().clone()
    }

    pub(crate) fn descriptors(&self) -> Vec<InvocationDescriptor> {
        self.descriptors.lock().unwrap().clone()
    }

    /// Highest number of calls observed running at once
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

fn id_from_url(url: &str) -> String {
    url.rsplit('=').next().unwrap_or(url).to_string()
}

#[async_trait]
impl FetchProvider for ScriptedProvider {
    async fn list_recent_items(
        &self,
        source_url: &str,
        limit: usize,
        descriptor: &InvocationDescriptor,
    ) -> Result<Vec<ItemSummary>> {
        let _guard = self.enter().await;
        self.list_calls.lock().unwrap().push(source_url.to_string());
        self.descriptors.lock().unwrap().push(descriptor.clone());

        let mut listings = self.listings.lock().unwrap();
        let script = listings.entry(source_url.to_string()).or_default();
        if script.failures_remaining > 0 {
            script.failures_remaining -= 1;
            return Err(Error::Fetch(script.error.clone()));
        }
        Ok(script.items.iter().take(limit).cloned().collect())
    }

    async fn acquire_item(
        &self,
        item_url: &str,
        _quality: &str,
        descriptor: &InvocationDescriptor,
    ) -> Result<AcquiredItem> {
        let _guard = self.enter().await;
        let id = id_from_url(item_url);
        self.acquire_calls.lock().unwrap().push(id.clone());
        self.descriptors.lock().unwrap().push(descriptor.clone());

        if let Some(error) = self.failing_items.lock().unwrap().get(&id) {
            return Err(Error::Fetch(error.clone()));
        }
        Ok(AcquiredItem {
            file_path: PathBuf::from(format!("/media/{id}.mp4")),
            thumbnail_path: Some(PathBuf::from(format!("/media/{id}.jpg"))),
            metadata_path: None,
            file_size_bytes: Some(2048),
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

