//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // Connect to database with foreign key enforcement and WAL mode
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }
        if current_version < 2 {
            Self::migrate_v2(&mut conn).await?;
        }

        Ok(())
    }

    /// Start a migration transaction
    async fn begin(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        tracing::info!(version, "Applying database migration");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;
        Ok(())
    }

    /// Record and commit a migration, or roll it back if `result` failed
    async fn finish(conn: &mut SqliteConnection, version: i32, result: Result<()>) -> Result<()> {
        let result = match result {
            Ok(()) => Self::record_migration(conn, version).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v{}: {}",
                            version, e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!(version, "Database migration complete");
        Ok(())
    }

    /// Migration v1: tracked channels and downloads
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        Self::begin(conn, 1).await?;
        let result = async {
            Self::create_channels_schema(conn).await?;
            Self::create_downloads_schema(conn).await
        }
        .await;
        Self::finish(conn, 1, result).await
    }

    /// Migration v2: index backing the sweep priority order
    async fn migrate_v2(conn: &mut SqliteConnection) -> Result<()> {
        Self::begin(conn, 2).await?;
        let result = Self::exec(
            conn,
            r#"
            CREATE INDEX idx_channels_sweep_order
            ON tracked_channels(is_active, last_checked_at, error_count, created_at)
            "#,
            "Failed to create sweep order index",
        )
        .await;
        Self::finish(conn, 2, result).await
    }

    /// Create tracked_channels table and its indexes
    async fn create_channels_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::exec(
            conn,
            r#"
            CREATE TABLE tracked_channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_channel_id TEXT NOT NULL UNIQUE,
                source_url TEXT NOT NULL,
                display_name TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                quality TEXT NOT NULL DEFAULT 'best',
                save_to_library INTEGER NOT NULL DEFAULT 1,
                scheduled_hour INTEGER NOT NULL DEFAULT 0
                    CHECK (scheduled_hour BETWEEN 0 AND 23),
                last_checked_at INTEGER,
                last_known_item_id TEXT,
                total_items_found INTEGER NOT NULL DEFAULT 0,
                total_items_downloaded INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
            "Failed to create tracked_channels table",
        )
        .await?;

        Self::exec(
            conn,
            "CREATE INDEX idx_channels_user ON tracked_channels(user_id)",
            "Failed to create channel user index",
        )
        .await
    }

    /// Create downloads table and its indexes
    async fn create_downloads_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::exec(
            conn,
            r#"
            CREATE TABLE downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_item_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                channel_id INTEGER REFERENCES tracked_channels(id) ON DELETE SET NULL,
                channel_name TEXT,
                original_url TEXT NOT NULL,
                quality TEXT NOT NULL,
                format TEXT NOT NULL,
                file_path TEXT NOT NULL,
                thumbnail_path TEXT,
                metadata_path TEXT,
                file_size_bytes INTEGER,
                duration_seconds REAL,
                user_id INTEGER NOT NULL,
                source TEXT NOT NULL DEFAULT 'manual',
                created_at INTEGER NOT NULL
            )
            "#,
            "Failed to create downloads table",
        )
        .await?;

        Self::exec(
            conn,
            "CREATE INDEX idx_downloads_channel ON downloads(channel_id)",
            "Failed to create downloads channel index",
        )
        .await
    }

    async fn exec(conn: &mut SqliteConnection, sql: &str, context: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!("{}: {}", context, e)))
        })?;
        Ok(())
    }

    /// Record a migration version
    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
