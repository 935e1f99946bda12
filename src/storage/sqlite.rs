//! SQLite override backend implementation
//!
//! This module provides a SQLite-based implementation of the `OverrideBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, OverrideBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{ManualLink, MergeExclusion, OverrideSide};

/// SQLite override backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use unified_resources::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./overrides.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();
        if db_path_str.trim().is_empty() {
            return Err(StorageError::InvalidConfig(
                "sqlite path must not be empty".to_string(),
            ));
        }

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    fn encode_side(side: &OverrideSide) -> StorageResult<String> {
        serde_json::to_string(side).map_err(|e| {
            StorageError::CorruptSide(format!("cannot encode: {e}"))
        })
    }

    fn decode_side(json: &str) -> StorageResult<OverrideSide> {
        serde_json::from_str(json).map_err(|e| {
            StorageError::CorruptSide(format!("cannot decode: {e}"))
        })
    }
}

#[async_trait]
impl OverrideBackend for SqliteBackend {
    #[instrument(skip(self, link), fields(tenant = %link.tenant))]
    async fn insert_link(&self, link: ManualLink) -> StorageResult<()> {
        let primary = Self::encode_side(&link.primary)?;
        let secondary = Self::encode_side(&link.secondary)?;

        sqlx::query(
            r#"
            INSERT INTO manual_links (tenant, primary_side, secondary_side, reason, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&link.tenant)
        .bind(primary)
        .bind(secondary)
        .bind(&link.reason)
        .bind(Self::timestamp_to_millis(&link.created_at))
        .execute(&self.pool)
        .await?;

        debug!("manual link stored");
        Ok(())
    }

    #[instrument(skip(self, exclusions), fields(count = exclusions.len()))]
    async fn insert_exclusions(&self, exclusions: Vec<MergeExclusion>) -> StorageResult<()> {
        if exclusions.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for exclusion in &exclusions {
            let side_a = Self::encode_side(&exclusion.side_a)?;
            let side_b = Self::encode_side(&exclusion.side_b)?;

            sqlx::query(
                r#"
                INSERT INTO merge_exclusions (tenant, side_a, side_b, note, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&exclusion.tenant)
            .bind(side_a)
            .bind(side_b)
            .bind(&exclusion.note)
            .bind(Self::timestamp_to_millis(&exclusion.created_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("merge exclusions stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn links(&self, tenant: &str) -> StorageResult<Vec<ManualLink>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant, primary_side, secondary_side, reason, created_at
            FROM manual_links
            WHERE tenant = ?
            ORDER BY id ASC
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StorageResult<ManualLink> {
                let primary: String = row.try_get("primary_side")?;
                let secondary: String = row.try_get("secondary_side")?;
                Ok(ManualLink {
                    tenant: row.try_get("tenant")?,
                    primary: Self::decode_side(&primary)?,
                    secondary: Self::decode_side(&secondary)?,
                    reason: row.try_get("reason")?,
                    created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn exclusions(&self, tenant: &str) -> StorageResult<Vec<MergeExclusion>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant, side_a, side_b, note, created_at
            FROM merge_exclusions
            WHERE tenant = ?
            ORDER BY id ASC
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StorageResult<MergeExclusion> {
                let side_a: String = row.try_get("side_a")?;
                let side_b: String = row.try_get("side_b")?;
                Ok(MergeExclusion {
                    tenant: row.try_get("tenant")?,
                    side_a: Self::decode_side(&side_a)?,
                    side_b: Self::decode_side(&side_b)?,
                    note: row.try_get("note")?,
                    created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let links: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM manual_links")
            .fetch_one(&self.pool)
            .await?;
        let exclusions: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM merge_exclusions")
            .fetch_one(&self.pool)
            .await?;

        Ok(format!(
            "SQLite: {} links, {} exclusions ({})",
            links.0, exclusions.0, self.db_path
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
