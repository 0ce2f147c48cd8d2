//! Browser playability of a media file

use crate::error::Result;
use crate::media_tools::{MediaToolkit, StreamKind};
use std::path::Path;
use tracing::{debug, warn};

/// Video codecs every target browser decodes
pub const COMPATIBLE_VIDEO: &[&str] = &["h264", "vp8", "vp9", "av1"];
/// Audio codecs every target browser decodes
pub const COMPATIBLE_AUDIO: &[&str] = &["aac", "mp3", "opus", "vorbis"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPair {
    pub video: String,
    pub audio: String,
}

impl CodecPair {
    pub fn is_browser_compatible(&self) -> bool {
        COMPATIBLE_VIDEO.contains(&self.video.as_str())
            && COMPATIBLE_AUDIO.contains(&self.audio.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playability {
    /// Serve the file as is
    Direct(CodecPair),
    /// Route through the transcode cache; `None` when probing failed
    NeedsTranscode(Option<CodecPair>),
}

/// Probe both stream codecs of `path`
pub async fn probe(tools: &dyn MediaToolkit, path: &Path) -> Result<CodecPair> {
    let video = tools.codec_name(path, StreamKind::Video).await?;
    let audio = tools.codec_name(path, StreamKind::Audio).await?;
    Ok(CodecPair { video, audio })
}

/// Decide how to serve `path`. Probe failures count as incompatible.
pub async fn classify(tools: &dyn MediaToolkit, path: &Path) -> Playability {
    match probe(tools, path).await {
        Ok(pair) if pair.is_browser_compatible() => {
            debug!(path = ?path, video = %pair.video, audio = %pair.audio, "Directly playable");
            Playability::Direct(pair)
        }
        Ok(pair) => {
            debug!(path = ?path, video = %pair.video, audio = %pair.audio, "Needs transcoding");
            Playability::NeedsTranscode(Some(pair))
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "Codec probe failed, assuming transcode is needed");
            Playability::NeedsTranscode(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_tools::FfmpegToolkit;
    use crate::test_support::FakeTools;

    fn pair(video: &str, audio: &str) -> CodecPair {
        CodecPair {
            video: video.to_string(),
            audio: audio.to_string(),
        }
    }

    #[test]
    fn test_whitelist() {
        assert!(pair("h264", "aac").is_browser_compatible());
        assert!(pair("vp9", "opus").is_browser_compatible());
        assert!(pair("av1", "vorbis").is_browser_compatible());
        assert!(!pair("h264", "ac3").is_browser_compatible());
        assert!(!pair("hevc", "aac").is_browser_compatible());
        assert!(!pair("", "").is_browser_compatible());
    }

    #[tokio::test]
    async fn test_tool_failure_is_incompatible() {
        let tools = FfmpegToolkit::new("/nonexistent/ffprobe", "/nonexistent/ffmpeg");
        let result = classify(&tools, Path::new("/tmp/whatever.mkv")).await;
        assert_eq!(result, Playability::NeedsTranscode(None));
    }

    #[tokio::test]
    async fn test_ac3_audio_needs_transcode() {
        let tools = FakeTools::new("h264", "ac3");
        let result = classify(&tools, Path::new("movie.mkv")).await;
        assert_eq!(result, Playability::NeedsTranscode(Some(pair("h264", "ac3"))));
    }

    #[tokio::test]
    async fn test_h264_aac_is_direct() {
        let tools = FakeTools::new("h264", "aac");
        let result = classify(&tools, Path::new("movie.mp4")).await;
        assert_eq!(result, Playability::Direct(pair("h264", "aac")));
        assert_eq!(tools.probe_count(), 2);
    }
}
