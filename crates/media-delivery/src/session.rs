//! Per-request streaming state

use std::io;
use std::path::Path;
use std::time::Instant;
use tempfile::TempPath;
use tracing::{debug, info};

/// Scratch copy of an origin blob, removed when dropped
#[derive(Debug)]
pub struct TransientFile {
    path: TempPath,
}

impl TransientFile {
    /// Reserve `stream-<id>-<random>.mp4` in `dir`
    pub fn create(dir: &Path, video_id: i64) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = tempfile::Builder::new()
            .prefix(&format!("stream-{}-", video_id))
            .suffix(".mp4")
            .tempfile_in(dir)?
            .into_temp_path();
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        debug!(path = ?self.path.to_path_buf(), "Removing transient file");
    }
}

/// One playback request, alive until its response body is finished or dropped
#[derive(Debug)]
pub struct StreamSession {
    video_id: i64,
    started: Instant,
    transient: Option<TransientFile>,
}

impl StreamSession {
    pub fn new(video_id: i64) -> Self {
        debug!(video_id, "Stream started");
        Self {
            video_id,
            started: Instant::now(),
            transient: None,
        }
    }

    pub fn video_id(&self) -> i64 {
        self.video_id
    }

    /// Tie a transient file's lifetime to this session
    pub fn attach(&mut self, file: TransientFile) -> &Path {
        self.transient.insert(file).path()
    }

    pub fn transient_path(&self) -> Option<&Path> {
        self.transient.as_ref().map(TransientFile::path)
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        info!(
            video_id = self.video_id,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            refetched = self.transient.is_some(),
            "Stream finished"
        );
    }
}
