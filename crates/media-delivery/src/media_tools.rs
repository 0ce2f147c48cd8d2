//! External media tools (ffprobe / ffmpeg)

use crate::error::{DeliveryError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Which stream of a container to inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    /// ffprobe stream selector
    pub fn selector(self) -> &'static str {
        match self {
            StreamKind::Video => "v:0",
            StreamKind::Audio => "a:0",
        }
    }
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Codec name of the first stream of `kind` in `path`
    async fn codec_name(&self, path: &Path, kind: StreamKind) -> Result<String>;

    /// Re-encode `input` into a browser-playable MP4 at `output`
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Runs the ffmpeg binaries as subprocesses
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffprobe: String,
    ffmpeg: String,
}

impl FfmpegToolkit {
    pub fn new(ffprobe: impl Into<String>, ffmpeg: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new("ffprobe", "ffmpeg")
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn codec_name(&self, path: &Path, kind: StreamKind) -> Result<String> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                kind.selector(),
                "-show_entries",
                "stream=codec_name",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeliveryError::ToolFailure(format!("{}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            return Err(DeliveryError::ToolFailure(format!(
                "{} exited with {}: {}",
                self.ffprobe,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let codec = stdout.lines().next().unwrap_or("").trim().to_string();
        debug!(path = ?path, stream = kind.selector(), codec = %codec, "Probed codec");
        Ok(codec)
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.ffmpeg)
            .arg("-i")
            .arg(input)
            .args([
                "-map",
                "0:v:0",
                "-map",
                "0:a",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-crf",
                "23",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-ac",
                "2",
                "-movflags",
                "+faststart",
                "-max_muxing_queue_size",
                "1024",
                "-y",
            ])
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeliveryError::ToolFailure(format!("{}: {}", self.ffmpeg, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(input = ?input, status = %result.status, stderr = %stderr, "ffmpeg failed");
            return Err(DeliveryError::ToolFailure(format!(
                "{} exited with {}",
                self.ffmpeg, result.status
            )));
        }

        Ok(())
    }
}
