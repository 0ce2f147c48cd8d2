//! Service configuration from environment variables

use crate::error::{DeliveryError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const GIB: u64 = 1024 * 1024 * 1024;

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub port: u16,
    pub database_url: String,
    /// Scratch files and transcoded renditions live here
    pub download_dir: PathBuf,
    /// Local storage root of the Bot API server
    pub origin_storage_root: PathBuf,
    pub bot_token: Option<String>,
    pub bot_api_url: Option<String>,
    pub fallback_proxy_url: Option<String>,
    pub ffprobe_bin: String,
    pub ffmpeg_bin: String,
    pub origin_max_bytes: u64,
    pub origin_max_files: usize,
    pub origin_sweep_interval: Duration,
    pub download_max_bytes: u64,
    pub download_sweep_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "postgres://localhost/videos".to_string(),
            download_dir: PathBuf::from("downloads"),
            origin_storage_root: PathBuf::from("/var/lib/telegram-bot-api"),
            bot_token: None,
            bot_api_url: None,
            fallback_proxy_url: None,
            ffprobe_bin: "ffprobe".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            origin_max_bytes: 2 * GIB,
            origin_max_files: 5,
            origin_sweep_interval: Duration::from_secs(120),
            download_max_bytes: 10 * GIB,
            download_sweep_interval: Duration::from_secs(600),
        }
    }
}

impl DeliveryConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key lookup.
    ///
    /// Unparsable numbers fall back to their defaults; malformed URLs are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());

        let bot_api_url = non_empty("TELEGRAM_API_URL");
        if let Some(url) = &bot_api_url {
            validate_url("TELEGRAM_API_URL", url)?;
        }
        let fallback_proxy_url = non_empty("FALLBACK_PROXY_URL");
        if let Some(url) = &fallback_proxy_url {
            validate_url("FALLBACK_PROXY_URL", url)?;
        }

        Ok(Self {
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database_url: non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            download_dir: non_empty("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            origin_storage_root: non_empty("ORIGIN_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.origin_storage_root),
            bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            bot_api_url,
            fallback_proxy_url,
            ffprobe_bin: non_empty("FFPROBE_BIN").unwrap_or(defaults.ffprobe_bin),
            ffmpeg_bin: non_empty("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            origin_max_bytes: number("ORIGIN_MAX_BYTES").unwrap_or(defaults.origin_max_bytes),
            origin_max_files: number("ORIGIN_MAX_FILES")
                .map(|n| n as usize)
                .unwrap_or(defaults.origin_max_files),
            origin_sweep_interval: number("ORIGIN_SWEEP_SECS")
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.origin_sweep_interval),
            download_max_bytes: number("DOWNLOAD_MAX_BYTES")
                .unwrap_or(defaults.download_max_bytes),
            download_sweep_interval: number("DOWNLOAD_SWEEP_SECS")
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_sweep_interval),
        })
    }

    /// The origin adapter needs both a token and an API URL
    pub fn origin_enabled(&self) -> bool {
        self.bot_token.is_some() && self.bot_api_url.is_some()
    }
}

fn validate_url(key: &str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| DeliveryError::Config(format!("invalid {}: {}", key, e)))
}
