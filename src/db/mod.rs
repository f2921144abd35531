//! Database layer for channel-tracker
//!
//! SQLite persistence for tracked channels and download records. [`Database`]
//! implements both [`ChannelRepository`](crate::repository::ChannelRepository)
//! and [`DownloadRepository`](crate::repository::DownloadRepository).
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`channels`]: Tracked channel queries and bookkeeping updates
//! - [`downloads`]: Download records and dedup lookups
//!
//! Timestamps are stored as unix seconds.

use crate::types::{ChannelId, DownloadRecord, DownloadSource, TrackedChannel};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod channels;
mod downloads;
mod migrations;

/// Tracked channel record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ChannelRow {
    id: i64,
    source_channel_id: String,
    source_url: String,
    display_name: String,
    user_id: i64,
    is_active: bool,
    quality: String,
    save_to_library: bool,
    scheduled_hour: i64,
    last_checked_at: Option<i64>,
    last_known_item_id: Option<String>,
    total_items_found: i64,
    total_items_downloaded: i64,
    error_count: i64,
    last_error: Option<String>,
    created_at: i64,
}

impl From<ChannelRow> for TrackedChannel {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: ChannelId(row.id),
            source_channel_id: row.source_channel_id,
            source_url: row.source_url,
            display_name: row.display_name,
            user_id: row.user_id,
            is_active: row.is_active,
            quality: row.quality,
            save_to_library: row.save_to_library,
            scheduled_hour: row.scheduled_hour.clamp(0, 23) as u8,
            last_checked_at: row.last_checked_at.map(from_unix),
            last_known_item_id: row.last_known_item_id,
            total_items_found: row.total_items_found,
            total_items_downloaded: row.total_items_downloaded,
            error_count: u32::try_from(row.error_count).unwrap_or(0),
            last_error: row.last_error,
            created_at: from_unix(row.created_at),
        }
    }
}

/// Download record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub(crate) struct DownloadRow {
    id: i64,
    source_item_id: String,
    title: String,
    channel_id: Option<i64>,
    channel_name: Option<String>,
    original_url: String,
    quality: String,
    format: String,
    file_path: String,
    thumbnail_path: Option<String>,
    metadata_path: Option<String>,
    file_size_bytes: Option<i64>,
    duration_seconds: Option<f64>,
    user_id: i64,
    source: String,
    created_at: i64,
}

impl From<DownloadRow> for DownloadRecord {
    fn from(row: DownloadRow) -> Self {
        Self {
            id: row.id,
            source_item_id: row.source_item_id,
            title: row.title,
            channel_id: row.channel_id.map(ChannelId),
            channel_name: row.channel_name,
            original_url: row.original_url,
            quality: row.quality,
            format: row.format,
            file_path: PathBuf::from(row.file_path),
            thumbnail_path: row.thumbnail_path.map(PathBuf::from),
            metadata_path: row.metadata_path.map(PathBuf::from),
            file_size_bytes: row.file_size_bytes.and_then(|s| u64::try_from(s).ok()),
            duration_seconds: row.duration_seconds,
            user_id: row.user_id,
            source: DownloadSource::from_tag(&row.source),
            created_at: from_unix(row.created_at),
        }
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Database handle for channel-tracker
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
