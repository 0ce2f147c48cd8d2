//! Transcoded renditions cached on disk, one per video

use crate::error::{DeliveryError, Result};
use crate::media_tools::MediaToolkit;
use crate::single_flight::KeyedLocks;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct TranscodeCache {
    dir: PathBuf,
    tools: Arc<dyn MediaToolkit>,
    locks: KeyedLocks<i64>,
}

impl TranscodeCache {
    pub fn new(dir: PathBuf, tools: Arc<dyn MediaToolkit>) -> Self {
        Self {
            dir,
            tools,
            locks: KeyedLocks::new(),
        }
    }

    /// Where the rendition for `video_id` lives once created
    pub fn cached_path(&self, video_id: i64) -> PathBuf {
        self.dir.join(format!("transcoded-{}.mp4", video_id))
    }

    /// Return the cached rendition, transcoding `source` first if there is none.
    ///
    /// Concurrent callers for the same id share one transcoder run.
    pub async fn get_or_create(&self, video_id: i64, source: &Path) -> Result<PathBuf> {
        let target = self.cached_path(video_id);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(video_id, path = ?target, "Using cached transcode");
            return Ok(target);
        }

        let _guard = self.locks.acquire(video_id).await;
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(video_id, path = ?target, "Transcode finished while waiting");
            return Ok(target);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        // Deleted on drop unless persisted
        let staging = tempfile::Builder::new()
            .prefix(&format!("transcoded-{}-", video_id))
            .suffix(".partial.mp4")
            .tempfile_in(&self.dir)?
            .into_temp_path();

        info!(video_id, source = ?source, "Transcoding video");
        let started = Instant::now();
        self.tools.transcode(source, &staging).await?;

        staging
            .persist(&target)
            .map_err(|e| DeliveryError::Io(Box::new(e.error)))?;

        info!(
            video_id,
            path = ?target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcode cached"
        );
        Ok(target)
    }
}
