//! Tracked channel queries and bookkeeping updates.

use crate::error::DatabaseError;
use crate::repository::ChannelRepository;
use crate::types::{ChannelId, NewTrackedChannel, TrackedChannel};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ChannelRow, Database};

const CHANNEL_COLUMNS: &str = r#"
    id, source_channel_id, source_url, display_name, user_id, is_active, quality,
    save_to_library, scheduled_hour, last_checked_at, last_known_item_id,
    total_items_found, total_items_downloaded, error_count, last_error, created_at
"#;

impl Database {
    async fn fetch_channels(&self, filter: &str, context: &str) -> Result<Vec<TrackedChannel>> {
        let sql = format!(
            "SELECT {} FROM tracked_channels {} \
             ORDER BY last_checked_at ASC NULLS FIRST, error_count ASC, created_at ASC, id ASC",
            CHANNEL_COLUMNS, filter
        );
        let rows = sqlx::query_as::<_, ChannelRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!("{}: {}", context, e)))
            })?;

        Ok(rows.into_iter().map(TrackedChannel::from).collect())
    }

    /// Every channel regardless of state, in sweep order
    pub async fn list_channels(&self) -> Result<Vec<TrackedChannel>> {
        self.fetch_channels("", "Failed to list channels").await
    }

    /// Run a single-row update and map zero affected rows to `ChannelNotFound`
    async fn update_channel<'a>(
        &self,
        id: ChannelId,
        query: sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>>,
        context: &str,
    ) -> Result<()> {
        let result = query.execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!("{}: {}", context, e)))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::ChannelNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelRepository for Database {
    async fn find_active(&self) -> Result<Vec<TrackedChannel>> {
        self.fetch_channels("WHERE is_active = 1", "Failed to get active channels")
            .await
    }

    async fn find_inactive(&self) -> Result<Vec<TrackedChannel>> {
        self.fetch_channels("WHERE is_active = 0", "Failed to get inactive channels")
            .await
    }

    async fn find_by_id(&self, id: ChannelId) -> Result<Option<TrackedChannel>> {
        let sql = format!("SELECT {} FROM tracked_channels WHERE id = ?", CHANNEL_COLUMNS);
        let row = sqlx::query_as::<_, ChannelRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get channel: {}",
                    e
                )))
            })?;

        Ok(row.map(TrackedChannel::from))
    }

    async fn create(&self, channel: NewTrackedChannel) -> Result<TrackedChannel> {
        if channel.scheduled_hour > 23 {
            return Err(Error::config(
                "scheduled_hour",
                format!("must be between 0 and 23, got {}", channel.scheduled_hour),
            ));
        }
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO tracked_channels (source_channel_id, source_url, display_name, user_id,
                                          quality, save_to_library, scheduled_hour, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.source_channel_id)
        .bind(&channel.source_url)
        .bind(&channel.display_name)
        .bind(channel.user_id)
        .bind(&channel.quality)
        .bind(channel.save_to_library)
        .bind(i64::from(channel.scheduled_hour))
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::Duplicate(format!(
                "channel {} is already tracked",
                channel.source_channel_id
            )),
            _ => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert channel: {}",
                e
            ))),
        })?;

        let id = ChannelId(result.last_insert_rowid());
        self.find_by_id(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!("channel {} after insert", id)))
        })
    }

    async fn save(&self, channel: &TrackedChannel) -> Result<()> {
        let query = sqlx::query(
            r#"
            UPDATE tracked_channels
            SET source_url = ?, display_name = ?, is_active = ?, quality = ?,
                save_to_library = ?, scheduled_hour = ?, last_checked_at = ?,
                last_known_item_id = ?, total_items_found = ?, total_items_downloaded = ?,
                error_count = ?, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(&channel.source_url)
        .bind(&channel.display_name)
        .bind(channel.is_active)
        .bind(&channel.quality)
        .bind(channel.save_to_library)
        .bind(i64::from(channel.scheduled_hour))
        .bind(channel.last_checked_at.map(|t| t.timestamp()))
        .bind(&channel.last_known_item_id)
        .bind(channel.total_items_found)
        .bind(channel.total_items_downloaded)
        .bind(i64::from(channel.error_count))
        .bind(&channel.last_error)
        .bind(channel.id);

        self.update_channel(channel.id, query, "Failed to save channel")
            .await
    }

    async fn increment_error(
        &self,
        id: ChannelId,
        message: &str,
        threshold: u32,
    ) -> Result<TrackedChannel> {
        // right-hand expressions see the pre-update row
        let query = sqlx::query(
            r#"
            UPDATE tracked_channels
            SET error_count = error_count + 1,
                last_error = ?,
                is_active = CASE WHEN error_count + 1 >= ? THEN 0 ELSE is_active END
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(i64::from(threshold))
        .bind(id);
        self.update_channel(id, query, "Failed to increment channel errors")
            .await?;

        self.find_by_id(id).await?.ok_or(Error::ChannelNotFound(id))
    }

    async fn reset_errors(&self, id: ChannelId) -> Result<()> {
        let query = sqlx::query(
            "UPDATE tracked_channels SET error_count = 0, last_error = NULL WHERE id = ?",
        )
        .bind(id);
        self.update_channel(id, query, "Failed to reset channel errors")
            .await
    }

    async fn reactivate(&self, id: ChannelId) -> Result<()> {
        let query = sqlx::query(
            "UPDATE tracked_channels SET is_active = 1, error_count = 0, last_error = NULL WHERE id = ?",
        )
        .bind(id);
        self.update_channel(id, query, "Failed to reactivate channel")
            .await
    }

    async fn record_item_found(&self, id: ChannelId) -> Result<()> {
        let query = sqlx::query(
            "UPDATE tracked_channels SET total_items_found = total_items_found + 1 WHERE id = ?",
        )
        .bind(id);
        self.update_channel(id, query, "Failed to record found item")
            .await
    }

    async fn record_item_downloaded(&self, id: ChannelId) -> Result<()> {
        let query = sqlx::query(
            "UPDATE tracked_channels SET total_items_downloaded = total_items_downloaded + 1 WHERE id = ?",
        )
        .bind(id);
        self.update_channel(id, query, "Failed to record downloaded item")
            .await
    }

    async fn set_last_known_item(&self, id: ChannelId, item_id: &str) -> Result<()> {
        let query = sqlx::query("UPDATE tracked_channels SET last_known_item_id = ? WHERE id = ?")
            .bind(item_id)
            .bind(id);
        self.update_channel(id, query, "Failed to set last known item")
            .await
    }

    async fn mark_checked(&self, id: ChannelId, at: DateTime<Utc>) -> Result<()> {
        let query = sqlx::query("UPDATE tracked_channels SET last_checked_at = ? WHERE id = ?")
            .bind(at.timestamp())
            .bind(id);
        self.update_channel(id, query, "Failed to mark channel checked")
            .await
    }
}
