//! Persistence seams used by the processor and scheduler
//!
//! Every mutation is a single-row update keyed by id. Nothing here needs a
//! cross-row transaction, so each bookkeeping call is safe to repeat when a
//! channel pass is retried.

use crate::error::Result;
use crate::types::{ChannelId, DownloadRecord, NewDownloadRecord, NewTrackedChannel, TrackedChannel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage for tracked channels
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Active channels in sweep priority order (see [`prioritize`])
    async fn find_active(&self) -> Result<Vec<TrackedChannel>>;

    /// Deactivated channels
    async fn find_inactive(&self) -> Result<Vec<TrackedChannel>>;

    /// Look up one channel
    async fn find_by_id(&self, id: ChannelId) -> Result<Option<TrackedChannel>>;

    /// Register a channel
    async fn create(&self, channel: NewTrackedChannel) -> Result<TrackedChannel>;

    /// Overwrite every mutable field of a channel
    async fn save(&self, channel: &TrackedChannel) -> Result<()>;

    /// Add one to the error count and record `message`
    ///
    /// When the new count reaches `threshold` the channel is deactivated in the
    /// same update. Returns the channel as stored afterwards.
    async fn increment_error(
        &self,
        id: ChannelId,
        message: &str,
        threshold: u32,
    ) -> Result<TrackedChannel>;

    /// Clear the error count and last error; never changes `is_active`
    async fn reset_errors(&self, id: ChannelId) -> Result<()>;

    /// Set `is_active` and clear the error state
    async fn reactivate(&self, id: ChannelId) -> Result<()>;

    /// Add one to the found counter
    async fn record_item_found(&self, id: ChannelId) -> Result<()>;

    /// Add one to the downloaded counter
    async fn record_item_downloaded(&self, id: ChannelId) -> Result<()>;

    /// Move the high-water mark
    async fn set_last_known_item(&self, id: ChannelId, item_id: &str) -> Result<()>;

    /// Record a completed check
    async fn mark_checked(&self, id: ChannelId, at: DateTime<Utc>) -> Result<()>;
}

/// Storage for download records
#[async_trait]
pub trait DownloadRepository: Send + Sync {
    /// The record for an external item id, if any
    async fn find_by_source_id(&self, source_item_id: &str) -> Result<Option<DownloadRecord>>;

    /// Store a new record
    ///
    /// # Errors
    ///
    /// [`Error::Duplicate`](crate::Error::Duplicate) if the external item id is
    /// already recorded.
    async fn create(&self, record: NewDownloadRecord) -> Result<DownloadRecord>;
}

/// Sort channels into sweep order
///
/// Never-checked channels come first, then the longest-waiting, then the
/// healthiest, then the oldest registration.
pub fn prioritize(channels: &mut [TrackedChannel]) {
    channels.sort_by(|a, b| {
        a.last_checked_at
            .cmp(&b.last_checked_at)
            .then(a.error_count.cmp(&b.error_count))
            .then(a.created_at.cmp(&b.created_at))
    });
}
