//! Per-channel discovery and acquisition
//!
//! [`ChannelProcessor`] runs one pass over one channel: list the most recent
//! items through the execution engine, walk them down to the high-water mark,
//! skip anything already recorded, and acquire the rest. Only a listing
//! failure fails the pass; item failures are counted and the walk continues.
//!
//! [`ChannelProcessor::process_channel_with_retry`] wraps a pass in the
//! channel-level retry and owns the error bookkeeping that drives automatic
//! deactivation.

use crate::config::{HighWaterMark, ProcessorConfig};
use crate::engine::ExecutionEngine;
use crate::error::{Error, Result};
use crate::fetch::FetchProvider;
use crate::repository::{ChannelRepository, DownloadRepository};
use crate::retry::{RetryPolicy, retry_fixed};
use crate::stats::ChannelRunStats;
use crate::types::{ChannelId, DownloadSource, Event, ItemSummary, NewDownloadRecord, TrackedChannel};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// Storage and provider handles a processor works against
#[derive(Clone)]
pub struct Collaborators {
    /// Tracked channel storage
    pub channels: Arc<dyn ChannelRepository>,
    /// Download record storage
    pub downloads: Arc<dyn DownloadRepository>,
    /// Fetch provider invoked through the engine
    pub fetch: Arc<dyn FetchProvider>,
}

/// Runs channel passes; cheap to clone into concurrent tasks
#[derive(Clone)]
pub struct ChannelProcessor {
    channels: Arc<dyn ChannelRepository>,
    downloads: Arc<dyn DownloadRepository>,
    fetch: Arc<dyn FetchProvider>,
    engine: ExecutionEngine,
    config: ProcessorConfig,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    /// Items already counted as found whose acquisition has not succeeded yet
    unresolved: Arc<Mutex<HashMap<ChannelId, HashSet<String>>>>,
}

/// What happened to one new item during a pass
struct ItemOutcome {
    id: String,
    /// Acquired now, or already recorded
    accounted: bool,
}

/// Running state of one channel pass
#[derive(Default)]
struct Pass {
    stats: ChannelRunStats,
    /// Items counted as found during this pass
    found: HashSet<String>,
    mark_moved: bool,
    acquired_any: bool,
}

impl ChannelProcessor {
    /// Create a processor
    ///
    /// `cancel` should be the same token the engine was given, so a stop
    /// request is honoured at both retry levels.
    pub fn new(
        collaborators: Collaborators,
        engine: ExecutionEngine,
        config: ProcessorConfig,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            channels: collaborators.channels,
            downloads: collaborators.downloads,
            fetch: collaborators.fetch,
            engine,
            config,
            event_tx,
            cancel,
            unresolved: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Processor settings
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Channel storage this processor writes to
    pub fn channels(&self) -> &Arc<dyn ChannelRepository> {
        &self.channels
    }

    fn emit(&self, event: Event) {
        // no subscribers is fine
        self.event_tx.send(event).ok();
    }

    /// Run [`process_channel`](Self::process_channel) with channel-level retry
    ///
    /// A success clears the channel's error state. Running out of attempts
    /// increments the error count, which deactivates the channel once it
    /// reaches the configured threshold. A pass interrupted by shutdown is
    /// neither a success nor a failure and leaves the channel untouched.
    ///
    /// Never fails: every outcome is reported through the returned stats,
    /// events and the channel record.
    pub async fn process_channel_with_retry(&self, channel: &TrackedChannel) -> ChannelRunStats {
        let policy = RetryPolicy {
            max_attempts: self.config.retry_attempts,
            delay: self.config.retry_delay,
        };

        let result = retry_fixed(&policy, &self.cancel, |attempt| {
            tracing::debug!(channel_id = %channel.id, attempt, "processing channel");
            self.process_channel(channel)
        })
        .await;

        match result {
            Ok(stats) => {
                if let Err(e) = self.channels.reset_errors(channel.id).await {
                    tracing::warn!(channel_id = %channel.id, error = %e, "failed to reset channel errors");
                }
                self.emit(Event::ChannelChecked {
                    channel_id: channel.id,
                    items_found: stats.items_found,
                    items_downloaded: stats.items_downloaded,
                });
                stats
            }
            Err(Error::ShuttingDown) => {
                tracing::info!(channel_id = %channel.id, "channel pass interrupted by shutdown");
                ChannelRunStats::default()
            }
            Err(e) => {
                self.record_failure(channel, &e).await;
                ChannelRunStats::failed()
            }
        }
    }

    async fn record_failure(&self, channel: &TrackedChannel, error: &Error) {
        let message = error.to_string();
        tracing::error!(
            channel_id = %channel.id,
            channel = %channel.display_name,
            error = %message,
            "channel failed after all retry attempts"
        );

        let updated = match self
            .channels
            .increment_error(channel.id, &message, self.config.error_threshold)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(channel_id = %channel.id, error = %e, "failed to record channel error");
                return;
            }
        };

        self.emit(Event::ChannelFailed {
            channel_id: channel.id,
            error: message,
            error_count: updated.error_count,
        });

        if channel.is_active && !updated.is_active {
            tracing::warn!(
                channel_id = %channel.id,
                error_count = updated.error_count,
                threshold = self.config.error_threshold,
                "channel deactivated after repeated failures"
            );
            self.emit(Event::ChannelDeactivated {
                channel_id: channel.id,
                error_count: updated.error_count,
            });
        }
    }

    /// One pass over `channel`
    ///
    /// An item is counted as found once. If its acquisition fails it stays
    /// unresolved and is retried on later passes without being counted again.
    ///
    /// # Errors
    ///
    /// Fails when listing fails (after the engine has exhausted its
    /// strategies), when the channel's own bookkeeping cannot be written, or
    /// with [`Error::ShuttingDown`] if stopped mid-pass. Anything that goes
    /// wrong with a single item, including download store lookups, is counted
    /// in the returned stats instead.
    pub async fn process_channel(&self, channel: &TrackedChannel) -> Result<ChannelRunStats> {
        let mut pass = Pass::default();
        pass.stats.succeeded = true;

        let items = self.list_items(channel).await?;
        if items.is_empty() {
            tracing::debug!(channel_id = %channel.id, "no items listed");
            self.channels.mark_checked(channel.id, Utc::now()).await?;
            return Ok(pass.stats);
        }

        let known = channel.last_known_item_id.as_deref();
        let fresh: Vec<&ItemSummary> = items
            .iter()
            .take_while(|item| Some(item.id.as_str()) != known)
            .collect();

        let previously_found = self.unresolved_items(channel.id).await;
        let mut still_unresolved = HashSet::new();
        let mut outcomes = Vec::with_capacity(fresh.len());

        for item in fresh {
            let accounted = match self
                .process_item(channel, item, &items[0].id, &previously_found, &mut pass)
                .await
            {
                Ok(accounted) => accounted,
                Err(Error::ShuttingDown) => return Err(Error::ShuttingDown),
                Err(e) => {
                    pass.stats.errors += 1;
                    tracing::warn!(
                        channel_id = %channel.id,
                        item_id = %item.id,
                        error = %e,
                        "failed to process item"
                    );
                    self.emit(Event::ItemFailed {
                        channel_id: channel.id,
                        item_id: item.id.clone(),
                        error: e.to_string(),
                    });
                    false
                }
            };
            if !accounted
                && (pass.found.contains(&item.id) || previously_found.contains(&item.id))
            {
                still_unresolved.insert(item.id.clone());
            }
            outcomes.push(ItemOutcome {
                id: item.id.clone(),
                accounted,
            });
        }
        self.set_unresolved_items(channel.id, still_unresolved).await;

        if self.config.high_water_mark == HighWaterMark::Confirmed
            && let Some(mark) = confirmed_mark(&outcomes)
            && Some(mark) != known
        {
            self.channels.set_last_known_item(channel.id, mark).await?;
        }

        self.channels.mark_checked(channel.id, Utc::now()).await?;

        let stats = pass.stats;
        tracing::info!(
            channel_id = %channel.id,
            items_found = stats.items_found,
            items_downloaded = stats.items_downloaded,
            errors = stats.errors,
            "channel checked"
        );
        Ok(stats)
    }

    /// Dedup, count and acquire one new item
    ///
    /// Returns whether the item is now accounted for. Acquisition failures
    /// come back as errors for the caller to count.
    async fn process_item(
        &self,
        channel: &TrackedChannel,
        item: &ItemSummary,
        newest_id: &str,
        previously_found: &HashSet<String>,
        pass: &mut Pass,
    ) -> Result<bool> {
        if self.downloads.find_by_source_id(&item.id).await?.is_some() {
            tracing::debug!(channel_id = %channel.id, item_id = %item.id, "already recorded, skipping");
            return Ok(true);
        }

        if previously_found.contains(&item.id) {
            tracing::debug!(channel_id = %channel.id, item_id = %item.id, "retrying unresolved item");
        } else {
            self.channels.record_item_found(channel.id).await?;
            pass.stats.items_found += 1;
            pass.found.insert(item.id.clone());
            self.emit(Event::ItemFound {
                channel_id: channel.id,
                item_id: item.id.clone(),
                title: item.title.clone(),
            });
        }

        if self.config.high_water_mark == HighWaterMark::FirstFound && !pass.mark_moved {
            self.channels
                .set_last_known_item(channel.id, newest_id)
                .await?;
            pass.mark_moved = true;
        }

        if pass.acquired_any {
            self.pause_between_items().await?;
        }
        pass.acquired_any = true;

        if let Some(download_id) = self.acquire(channel, item).await? {
            pass.stats.items_downloaded += 1;
            self.emit(Event::ItemDownloaded {
                channel_id: channel.id,
                item_id: item.id.clone(),
                download_id,
            });
        }
        Ok(true)
    }

    async fn unresolved_items(&self, id: ChannelId) -> HashSet<String> {
        self.unresolved
            .lock()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    async fn set_unresolved_items(&self, id: ChannelId, items: HashSet<String>) {
        let mut unresolved = self.unresolved.lock().await;
        if items.is_empty() {
            unresolved.remove(&id);
        } else {
            unresolved.insert(id, items);
        }
    }

    async fn list_items(&self, channel: &TrackedChannel) -> Result<Vec<ItemSummary>> {
        let fetch = &self.fetch;
        let url = channel.source_url.as_str();
        let limit = self.config.recent_item_limit;

        self.engine
            .list_recent_items(move |descriptor| async move {
                fetch.list_recent_items(url, limit, &descriptor).await
            })
            .await
    }

    /// Acquire and record one item
    ///
    /// Returns the new download id, or `None` if another writer recorded the
    /// item first.
    async fn acquire(&self, channel: &TrackedChannel, item: &ItemSummary) -> Result<Option<i64>> {
        let fetch = &self.fetch;
        let url = item.url.as_str();
        let quality = if channel.quality.is_empty() {
            self.config.default_quality.as_str()
        } else {
            channel.quality.as_str()
        };

        let acquired = self
            .engine
            .acquire_item(move |descriptor| async move {
                fetch.acquire_item(url, quality, &descriptor).await
            })
            .await?;

        let format = acquired
            .file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4")
            .to_string();

        let record = NewDownloadRecord {
            source_item_id: item.id.clone(),
            title: item.title.clone(),
            channel_id: Some(channel.id),
            channel_name: Some(channel.display_name.clone()),
            original_url: item.url.clone(),
            quality: quality.to_string(),
            format,
            file_path: acquired.file_path,
            thumbnail_path: acquired.thumbnail_path,
            metadata_path: acquired.metadata_path,
            file_size_bytes: acquired.file_size_bytes,
            duration_seconds: item.duration_seconds,
            user_id: channel.user_id,
            source: DownloadSource::AutoChannel,
        };

        match self.downloads.create(record).await {
            Ok(download) => {
                // the record exists; a missed counter is not an item failure
                if let Err(e) = self.channels.record_item_downloaded(channel.id).await {
                    tracing::warn!(channel_id = %channel.id, item_id = %item.id, error = %e, "failed to count download");
                }
                Ok(Some(download.id))
            }
            Err(Error::Duplicate(_)) => {
                tracing::debug!(item_id = %item.id, "item recorded concurrently, keeping existing record");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn pause_between_items(&self) -> Result<()> {
        if self.config.item_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::ShuttingDown),
            _ = tokio::time::sleep(self.config.item_delay) => Ok(()),
        }
    }
}

/// Newest item id such that it and every older new item are accounted for
///
/// `outcomes` is newest first. Returns `None` when the oldest new item failed,
/// leaving the mark where it was so the failure is walked again next time.
fn confirmed_mark(outcomes: &[ItemOutcome]) -> Option<&str> {
    outcomes
        .iter()
        .rev()
        .take_while(|o| o.accounted)
        .last()
        .map(|o| o.id.as_str())
}
