//! Core types for channel-tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a tracked channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl ChannelId {
    /// Create a new ChannelId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ChannelId> for i64 {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for ChannelId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ChannelId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ChannelId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// A user-registered content source monitored for new items
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedChannel {
    /// Internal identifier
    pub id: ChannelId,
    /// External channel id on the content source (unique)
    pub source_channel_id: String,
    /// Channel URL handed to the fetch provider
    pub source_url: String,
    /// Display name
    pub display_name: String,
    /// Owning user
    pub user_id: i64,

    /// Whether the scheduler picks this channel up
    pub is_active: bool,
    /// Quality preference, opaque to the scheduler (e.g. "best", "720p")
    pub quality: String,
    /// Whether acquired items should be added to the user's library
    pub save_to_library: bool,
    /// Preferred hour of day (0-23). Advisory only; sweeps run on a fixed cadence.
    pub scheduled_hour: u8,

    /// When the channel was last checked successfully
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Id of the newest item already accounted for
    pub last_known_item_id: Option<String>,
    /// Number of new items discovered over the channel's lifetime
    pub total_items_found: i64,
    /// Number of items acquired over the channel's lifetime
    pub total_items_downloaded: i64,

    /// Consecutive failed processing cycles
    pub error_count: u32,
    /// Message of the most recent failed cycle
    pub last_error: Option<String>,

    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// Data needed to register a new tracked channel
#[derive(Clone, Debug)]
pub struct NewTrackedChannel {
    /// External channel id on the content source
    pub source_channel_id: String,
    /// Channel URL
    pub source_url: String,
    /// Display name
    pub display_name: String,
    /// Owning user
    pub user_id: i64,
    /// Quality preference
    pub quality: String,
    /// Whether acquired items go to the user's library
    pub save_to_library: bool,
    /// Preferred hour of day (0-23)
    pub scheduled_hour: u8,
}

/// Provenance of a download record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadSource {
    /// Acquired automatically by a channel sweep
    AutoChannel,
    /// Requested manually by a user
    Manual,
}

impl DownloadSource {
    /// Tag stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadSource::AutoChannel => "auto_channel",
            DownloadSource::Manual => "manual",
        }
    }

    /// Parse a stored tag; unknown tags are treated as manual
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "auto_channel" => DownloadSource::AutoChannel,
            _ => DownloadSource::Manual,
        }
    }
}

/// A stored download (at most one per external item id)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Unique database id
    pub id: i64,
    /// External item id (dedup key)
    pub source_item_id: String,
    /// Item title
    pub title: String,
    /// Channel this item was discovered through, if any
    pub channel_id: Option<ChannelId>,
    /// Channel display name at acquisition time
    pub channel_name: Option<String>,
    /// URL the item was fetched from
    pub original_url: String,
    /// Quality preference used
    pub quality: String,
    /// Container format obtained
    pub format: String,
    /// Media file path
    pub file_path: PathBuf,
    /// Thumbnail sidecar
    pub thumbnail_path: Option<PathBuf>,
    /// Metadata sidecar
    pub metadata_path: Option<PathBuf>,
    /// Size of the media file
    pub file_size_bytes: Option<u64>,
    /// Duration of the item
    pub duration_seconds: Option<f64>,
    /// Owning user
    pub user_id: i64,
    /// Provenance tag
    pub source: DownloadSource,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// Data for a new download record
#[derive(Clone, Debug)]
pub struct NewDownloadRecord {
    /// External item id
    pub source_item_id: String,
    /// Item title
    pub title: String,
    /// Channel linkage
    pub channel_id: Option<ChannelId>,
    /// Channel display name
    pub channel_name: Option<String>,
    /// URL the item was fetched from
    pub original_url: String,
    /// Quality preference used
    pub quality: String,
    /// Container format obtained
    pub format: String,
    /// Media file path
    pub file_path: PathBuf,
    /// Thumbnail sidecar
    pub thumbnail_path: Option<PathBuf>,
    /// Metadata sidecar
    pub metadata_path: Option<PathBuf>,
    /// Size of the media file
    pub file_size_bytes: Option<u64>,
    /// Duration of the item
    pub duration_seconds: Option<f64>,
    /// Owning user
    pub user_id: i64,
    /// Provenance tag
    pub source: DownloadSource,
}

/// Summary of one recent item as reported by the fetch provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    /// External item id
    pub id: String,
    /// Item title
    pub title: String,
    /// Item URL
    pub url: String,
    /// Duration in seconds
    pub duration_seconds: Option<f64>,
    /// Upload date as reported by the source (YYYYMMDD)
    pub upload_date: Option<String>,
    /// View count
    pub view_count: Option<u64>,
}

/// Files produced by acquiring one item
#[derive(Clone, Debug, PartialEq)]
pub struct AcquiredItem {
    /// Media file
    pub file_path: PathBuf,
    /// Thumbnail sidecar
    pub thumbnail_path: Option<PathBuf>,
    /// Metadata sidecar
    pub metadata_path: Option<PathBuf>,
    /// Size of the media file
    pub file_size_bytes: Option<u64>,
}

/// Progress events published by the scheduler
///
/// Events are immutable snapshots pushed to every subscriber; nothing reads
/// shared progress state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A sweep started
    SweepStarted {
        /// Number of active channels selected
        channels: usize,
        /// Number of batches they were split into
        batches: usize,
    },

    /// A batch of channels is about to run concurrently
    BatchStarted {
        /// 1-based batch number
        batch: usize,
        /// Number of batches in the sweep
        of: usize,
        /// Channels in this batch
        channel_ids: Vec<ChannelId>,
    },

    /// A channel pass finished successfully
    ChannelChecked {
        /// Channel id
        channel_id: ChannelId,
        /// New items found in this pass
        items_found: u64,
        /// Items acquired in this pass
        items_downloaded: u64,
    },

    /// A channel exhausted its retry attempts
    ChannelFailed {
        /// Channel id
        channel_id: ChannelId,
        /// Final error message
        error: String,
        /// Error count after this failure
        error_count: u32,
    },

    /// A channel crossed the error threshold and was deactivated
    ChannelDeactivated {
        /// Channel id
        channel_id: ChannelId,
        /// Error count at deactivation
        error_count: u32,
    },

    /// A new item was discovered
    ItemFound {
        /// Channel id
        channel_id: ChannelId,
        /// External item id
        item_id: String,
        /// Item title
        title: String,
    },

    /// A new item was acquired and recorded
    ItemDownloaded {
        /// Channel id
        channel_id: ChannelId,
        /// External item id
        item_id: String,
        /// Download record id
        download_id: i64,
    },

    /// Acquiring a new item failed
    ItemFailed {
        /// Channel id
        channel_id: ChannelId,
        /// External item id
        item_id: String,
        /// Error message
        error: String,
    },

    /// A sweep finished
    SweepCompleted {
        /// Channels processed successfully
        channels_processed: u64,
        /// New items found
        items_found: u64,
        /// Items acquired
        items_downloaded: u64,
        /// Errors counted
        errors: u64,
        /// Wall-clock duration in milliseconds
        duration_ms: u64,
    },

    /// Daily cleanup finished
    CleanupCompleted {
        /// Expired credentials removed
        expired_credentials: usize,
        /// Temporary files removed
        temp_files: usize,
    },

    /// Weekly maintenance finished
    MaintenanceCompleted {
        /// Stored credentials that failed validation
        invalid_credentials: usize,
        /// Channels reactivated
        reactivated: Vec<ChannelId>,
    },
}
