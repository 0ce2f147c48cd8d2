//! Core types for the media delivery service

use chrono::{DateTime, Utc};
use dir_janitor::SweepReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A playable video as recorded by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogicalVideo {
    pub id: i64,
    /// Origin handle for the uploaded blob
    pub blob_id: Option<String>,
    /// Where the origin is likely to keep the blob, relative to its root
    pub storage_path: Option<String>,
}

impl LogicalVideo {
    /// The blob identifier, treating an empty string as missing
    pub fn blob_id(&self) -> Option<&str> {
        self.blob_id.as_deref().filter(|b| !b.is_empty())
    }

    pub fn storage_path(&self) -> Option<&str> {
        self.storage_path.as_deref().filter(|p| !p.is_empty())
    }
}

/// Last sweep of one janitor, as shown by the health endpoint
#[derive(Debug, Serialize)]
pub struct JanitorStatus {
    pub root: PathBuf,
    pub last_sweep: Option<SweepReport>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub started_at: DateTime<Utc>,
    pub janitors: Vec<JanitorStatus>,
}
