//! The origin resolver seam

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Bytes copied out of the origin by [`OriginResolver::fetch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub bytes: u64,
    /// Storage-relative path the origin used; may differ from the recorded one
    pub storage_path: Option<String>,
}

/// Source of previously uploaded blobs
#[async_trait]
pub trait OriginResolver: Send + Sync {
    /// Where the origin keeps the blob on local disk, given its recorded path
    fn local_path(&self, recorded_path: Option<&str>) -> Option<PathBuf>;

    /// Whether the blob is present on local disk right now
    async fn probe_exists(&self, _blob_id: &str, recorded_path: Option<&str>) -> bool {
        match self.local_path(recorded_path) {
            Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }

    /// Materialize the blob's bytes at `dest`, re-fetching upstream if needed
    async fn fetch(
        &self,
        blob_id: &str,
        recorded_path: Option<&str>,
        dest: &Path,
    ) -> Result<Materialized>;
}
