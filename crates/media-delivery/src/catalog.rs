//! Video catalog: maps a logical video id to its origin blob

use crate::error::Result;
use crate::types::LogicalVideo;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

/// Metadata store the delivery pipeline reads from
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn resolve_video(&self, id: i64) -> Result<Option<LogicalVideo>>;

    /// Remember where the origin keeps the blob now
    async fn record_storage_path(&self, id: i64, storage_path: &str) -> Result<()>;
}

/// Catalog backed by the `videos` table
pub struct PgVideoCatalog {
    pool: PgPool,
}

impl PgVideoCatalog {
    /// Connect to the database
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        info!("Database connection established");
        Ok(Self { pool })
    }
}

#[async_trait]
impl VideoCatalog for PgVideoCatalog {
    async fn resolve_video(&self, id: i64) -> Result<Option<LogicalVideo>> {
        let video = sqlx::query_as::<_, LogicalVideo>(
            r#"
            SELECT id::BIGINT AS id,
                   telegram_file_id AS blob_id,
                   telegram_file_path AS storage_path
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(video)
    }

    async fn record_storage_path(&self, id: i64, storage_path: &str) -> Result<()> {
        debug!(video_id = id, storage_path, "Recording storage path");
        sqlx::query("UPDATE videos SET telegram_file_path = $1 WHERE id = $2")
            .bind(storage_path)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
