use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use storesync_core::{
    config::DbConfig,
    error::{Backend, SyncError},
    models::{AcquireOutcome, QueueMetrics, RunLease},
    ports::{LeaseStore, StateStore},
};
use time::UtcDateTime;

const CHECKPOINT_KEY: &str = "queue.checkpoint";
const SNAPSHOT_KEY: &str = "queue.snapshot";

/// SQLite-backed run lease and sync state.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &DbConfig) -> Result<Self> {
        if !Sqlite::database_exists(&config.url).await.unwrap_or(false) {
            tracing::info!(url = %config.url, "Creating database");
            Sqlite::create_database(&config.url).await.context("Failed to create database")?;
            tracing::info!("Database created");
        }
        let pool =
            SqlitePool::connect(&config.url).await.context("Failed to connect to database")?;
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(Self { pool })
    }

    pub async fn close(&self) { self.pool.close().await }

    async fn state_value(&self, key: &str) -> Result<Option<String>, SyncError> {
        let row = sqlx::query("SELECT value FROM sync_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(|row| row.try_get("value")).transpose().map_err(store_error)
    }

    async fn put_state_value(&self, key: &str, value: &str) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE
            SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(UtcDateTime::now().unix_timestamp())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for Database {
    async fn acquire(&self, holder_id: &str, ttl: Duration) -> Result<AcquireOutcome, SyncError> {
        loop {
            let now = UtcDateTime::now();
            let expires_at = now + ttl;
            // Single-statement upsert so two concurrent runs cannot both win:
            // the update only fires when the existing lease is expired or ours.
            let result = sqlx::query(
                r#"
                INSERT INTO run_lease (id, holder_id, acquired_at, expires_at) VALUES (0, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE
                SET holder_id = excluded.holder_id,
                    acquired_at = excluded.acquired_at,
                    expires_at = excluded.expires_at
                WHERE run_lease.expires_at <= excluded.acquired_at
                   OR run_lease.holder_id = excluded.holder_id
                "#,
            )
            .bind(holder_id)
            .bind(now.unix_timestamp())
            .bind(expires_at.unix_timestamp())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
            if result.rows_affected() > 0 {
                return Ok(AcquireOutcome::Acquired(RunLease {
                    holder_id: holder_id.to_string(),
                    acquired_at: now,
                    expires_at,
                }));
            }
            // Lost to a live lease. Read it back for the report; if it expired
            // or vanished in the meantime, try again.
            let row = sqlx::query("SELECT holder_id, expires_at FROM run_lease WHERE id = 0")
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
            let Some(row) = row else { continue };
            let holder = row.try_get::<String, _>("holder_id").map_err(store_error)?;
            let expires = timestamp(row.try_get::<i64, _>("expires_at").map_err(store_error)?);
            if expires <= UtcDateTime::now() {
                continue;
            }
            return Ok(AcquireOutcome::Busy { holder_id: holder, expires_at: expires });
        }
    }

    async fn release(&self, lease: &RunLease) -> Result<(), SyncError> {
        // Only the current holder may delete; a reclaimed lease makes this a no-op.
        sqlx::query("DELETE FROM run_lease WHERE id = 0 AND holder_id = ?")
            .bind(&lease.holder_id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for Database {
    async fn checkpoint(&self) -> Result<Option<UtcDateTime>, SyncError> {
        let value = self.state_value(CHECKPOINT_KEY).await?;
        // Tolerate a corrupt value; the next run rebuilds it.
        Ok(value.and_then(|v| v.parse().ok()).map(timestamp))
    }

    async fn store_checkpoint(&self, at: UtcDateTime) -> Result<(), SyncError> {
        self.put_state_value(CHECKPOINT_KEY, &at.unix_timestamp().to_string()).await
    }

    async fn last_snapshot(&self) -> Result<Option<QueueMetrics>, SyncError> {
        let value = self.state_value(SNAPSHOT_KEY).await?;
        Ok(value.and_then(|v| serde_json::from_str(&v).ok()))
    }

    async fn store_snapshot(&self, metrics: &QueueMetrics) -> Result<(), SyncError> {
        let value = serde_json::to_string(metrics).map_err(|e| SyncError::Fatal {
            backend: Backend::StateStore,
            message: format!("failed to serialize snapshot: {e}"),
        })?;
        self.put_state_value(SNAPSHOT_KEY, &value).await
    }
}

fn store_error(err: sqlx::Error) -> SyncError {
    SyncError::Fatal { backend: Backend::StateStore, message: err.to_string() }
}

fn timestamp(secs: i64) -> UtcDateTime {
    UtcDateTime::from_unix_timestamp(secs).unwrap_or(UtcDateTime::UNIX_EPOCH)
}
