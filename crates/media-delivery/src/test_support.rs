//! In-memory stand-ins for the catalog, origin and media tools

use crate::catalog::VideoCatalog;
use crate::error::{DeliveryError, Result};
use crate::media_tools::{MediaToolkit, StreamKind};
use crate::types::LogicalVideo;
use async_trait::async_trait;
use origin_blob_resolver::{Materialized, OriginResolver, ResolverError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MemoryCatalog {
    videos: Mutex<HashMap<i64, LogicalVideo>>,
    writes: Mutex<Vec<(i64, String)>>,
}

impl MemoryCatalog {
    pub fn with_video(self, id: i64, blob_id: Option<&str>, storage_path: Option<&str>) -> Self {
        self.videos.lock().unwrap().insert(
            id,
            LogicalVideo {
                id,
                blob_id: blob_id.map(str::to_string),
                storage_path: storage_path.map(str::to_string),
            },
        );
        self
    }

    pub fn writes(&self) -> Vec<(i64, String)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoCatalog for MemoryCatalog {
    async fn resolve_video(&self, id: i64) -> Result<Option<LogicalVideo>> {
        Ok(self.videos.lock().unwrap().get(&id).cloned())
    }

    async fn record_storage_path(&self, id: i64, storage_path: &str) -> Result<()> {
        if let Some(video) = self.videos.lock().unwrap().get_mut(&id) {
            video.storage_path = Some(storage_path.to_string());
        }
        self.writes
            .lock()
            .unwrap()
            .push((id, storage_path.to_string()));
        Ok(())
    }
}

/// Origin that keeps blobs under `root` and "re-downloads" a fixed payload
pub struct FakeOrigin {
    root: PathBuf,
    payload: Vec<u8>,
    fetches: AtomicUsize,
    failure: Option<u16>,
    storage_path_after: Option<String>,
    delay: Duration,
}

impl FakeOrigin {
    pub fn new(root: &Path, payload: &[u8]) -> Self {
        Self {
            root: root.to_path_buf(),
            payload: payload.to_vec(),
            fetches: AtomicUsize::new(0),
            failure: None,
            storage_path_after: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_with(mut self, status: u16) -> Self {
        self.failure = Some(status);
        self
    }

    /// Also place the blob at `path` under the root, as a re-download would
    pub fn rematerializing_at(mut self, path: &str) -> Self {
        self.storage_path_after = Some(path.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginResolver for FakeOrigin {
    fn local_path(&self, recorded_path: Option<&str>) -> Option<PathBuf> {
        recorded_path.map(|p| self.root.join(p))
    }

    async fn fetch(
        &self,
        _blob_id: &str,
        _recorded_path: Option<&str>,
        dest: &Path,
    ) -> origin_blob_resolver::Result<Materialized> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        if let Some(status) = self.failure {
            return Err(ResolverError::Status(status, "Bad Gateway".to_string()));
        }

        if let Some(rel) = &self.storage_path_after {
            let on_disk = self.root.join(rel);
            if let Some(parent) = on_disk.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&on_disk, &self.payload).await?;
        }
        tokio::fs::write(dest, &self.payload).await?;

        Ok(Materialized {
            bytes: self.payload.len() as u64,
            storage_path: self.storage_path_after.clone(),
        })
    }
}

/// Media tools reporting fixed codecs and writing a marker as the rendition
pub struct FakeTools {
    video: String,
    audio: String,
    probe_fails: bool,
    transcode_fails: bool,
    delay: Duration,
    probes: AtomicUsize,
    transcodes: AtomicUsize,
    delete_when_inspected: Mutex<Option<PathBuf>>,
    dangling_renditions: AtomicUsize,
}

impl FakeTools {
    pub fn new(video: &str, audio: &str) -> Self {
        Self {
            video: video.to_string(),
            audio: audio.to_string(),
            probe_fails: false,
            transcode_fails: false,
            delay: Duration::ZERO,
            probes: AtomicUsize::new(0),
            transcodes: AtomicUsize::new(0),
            delete_when_inspected: Mutex::new(None),
            dangling_renditions: AtomicUsize::new(0),
        }
    }

    pub fn failing_probe(mut self) -> Self {
        self.probe_fails = true;
        self
    }

    pub fn failing_transcode(mut self) -> Self {
        self.transcode_fails = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delete `path` the first time its codecs are read, racing the request like a sweep would
    pub fn deleting_when_inspected(self, path: &Path) -> Self {
        *self.delete_when_inspected.lock().unwrap() = Some(path.to_path_buf());
        self
    }

    /// Make the next `count` renditions dangling symlinks, so they exist
    /// when checked but cannot be opened, like a rendition evicted mid-request
    #[cfg(unix)]
    pub fn with_dangling_renditions(self, count: usize) -> Self {
        self.dangling_renditions.store(count, Ordering::SeqCst);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn transcode_count(&self) -> usize {
        self.transcodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaToolkit for FakeTools {
    async fn codec_name(&self, path: &Path, kind: StreamKind) -> Result<String> {
        self.probes.fetch_add(1, Ordering::SeqCst);

        let doomed = {
            let mut slot = self.delete_when_inspected.lock().unwrap();
            match slot.as_deref() {
                Some(target) if target == path => slot.take(),
                _ => None,
            }
        };
        if let Some(target) = doomed {
            std::fs::remove_file(target)?;
        }

        if self.probe_fails {
            return Err(DeliveryError::ToolFailure("ffprobe exited 1".to_string()));
        }
        Ok(match kind {
            StreamKind::Video => self.video.clone(),
            StreamKind::Audio => self.audio.clone(),
        })
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.transcode_fails {
            return Err(DeliveryError::ToolFailure("ffmpeg exited 1".to_string()));
        }
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(DeliveryError::ToolFailure(format!(
                "{}: No such file or directory",
                input.display()
            )));
        }

        #[cfg(unix)]
        if self
            .dangling_renditions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            tokio::fs::remove_file(output).await?;
            tokio::fs::symlink(output.with_extension("evicted"), output).await?;
            return Ok(());
        }

        tokio::fs::write(output, b"transcoded").await?;
        Ok(())
    }
}
