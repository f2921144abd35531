//! Download records and dedup lookups.

use crate::error::DatabaseError;
use crate::repository::DownloadRepository;
use crate::types::{ChannelId, DownloadRecord, NewDownloadRecord};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::{Database, DownloadRow};

const DOWNLOAD_COLUMNS: &str = r#"
    id, source_item_id, title, channel_id, channel_name, original_url, quality, format,
    file_path, thumbnail_path, metadata_path, file_size_bytes, duration_seconds, user_id,
    source, created_at
"#;

impl Database {
    /// Downloads acquired through a channel, newest first
    pub async fn list_downloads_for_channel(&self, channel_id: ChannelId) -> Result<Vec<DownloadRecord>> {
        let sql = format!(
            "SELECT {} FROM downloads WHERE channel_id = ? ORDER BY created_at DESC, id DESC",
            DOWNLOAD_COLUMNS
        );
        let rows = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list downloads for channel: {}",
                    e
                )))
            })?;

        Ok(rows.into_iter().map(DownloadRecord::from).collect())
    }
}

#[async_trait]
impl DownloadRepository for Database {
    async fn find_by_source_id(&self, source_item_id: &str) -> Result<Option<DownloadRecord>> {
        let sql = format!(
            "SELECT {} FROM downloads WHERE source_item_id = ?",
            DOWNLOAD_COLUMNS
        );
        let row = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(source_item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to find download by source id: {}",
                    e
                )))
            })?;

        Ok(row.map(DownloadRecord::from))
    }

    async fn create(&self, record: NewDownloadRecord) -> Result<DownloadRecord> {
        let now = Utc::now();
        let file_size = record.file_size_bytes.and_then(|s| i64::try_from(s).ok());

        let result = sqlx::query(
            r#"
            INSERT INTO downloads (source_item_id, title, channel_id, channel_name, original_url,
                                   quality, format, file_path, thumbnail_path, metadata_path,
                                   file_size_bytes, duration_seconds, user_id, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.source_item_id)
        .bind(&record.title)
        .bind(record.channel_id)
        .bind(&record.channel_name)
        .bind(&record.original_url)
        .bind(&record.quality)
        .bind(&record.format)
        .bind(record.file_path.to_string_lossy().into_owned())
        .bind(
            record
                .thumbnail_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(
            record
                .metadata_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(file_size)
        .bind(record.duration_seconds)
        .bind(record.user_id)
        .bind(record.source.as_str())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Duplicate(record.source_item_id.clone())
            }
            _ => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download: {}",
                e
            ))),
        })?;

        Ok(DownloadRecord {
            id: result.last_insert_rowid(),
            source_item_id: record.source_item_id,
            title: record.title,
            channel_id: record.channel_id,
            channel_name: record.channel_name,
            original_url: record.original_url,
            quality: record.quality,
            format: record.format,
            file_path: record.file_path,
            thumbnail_path: record.thumbnail_path,
            metadata_path: record.metadata_path,
            file_size_bytes: record.file_size_bytes,
            duration_seconds: record.duration_seconds,
            user_id: record.user_id,
            source: record.source,
            // stored with second precision
            created_at: chrono::DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now),
        })
    }
}
