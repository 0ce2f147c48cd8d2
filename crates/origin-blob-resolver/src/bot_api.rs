//! Resolver backed by a local Bot API server
//!
//! The server keeps uploaded files under `<storage_base>/<token>/...` and
//! serves them at `<api>/file/bot<token>/<path>`. Once its own cache has
//! dropped a file, `getFile` makes it pull the file back from the cloud and
//! reports the absolute disk path it was written to.

use crate::error::{ResolverError, Result};
use crate::resolver::{Materialized, OriginResolver};
use crate::types::GetFileResponse;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// `getFile` can block while the server pulls the file back from the cloud
const GET_FILE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct BotApiResolver {
    client: Client,
    get_file_timeout: Duration,
    api_url: String,
    token: String,
    storage_base: PathBuf,
}

impl BotApiResolver {
    pub fn new(api_url: &str, token: impl Into<String>, storage_base: PathBuf) -> Self {
        Self {
            client: Client::new(),
            get_file_timeout: GET_FILE_TIMEOUT,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.into(),
            storage_base,
        }
    }

    /// Bound each `getFile` call. File downloads stay unbounded.
    pub fn with_get_file_timeout(mut self, timeout: Duration) -> Self {
        self.get_file_timeout = timeout;
        self
    }

    /// Directory the server keeps this bot's files in
    pub fn token_root(&self) -> PathBuf {
        self.storage_base.join(&self.token)
    }

    /// Turn a path reported by the server into one relative to the token directory.
    ///
    /// Strips the storage base and a leading `<token>/` segment if present.
    pub fn normalize_path(&self, path: &str) -> String {
        let base = self.storage_base.to_string_lossy();
        let prefix = format!("{}/", base.trim_end_matches('/'));
        let path = path.strip_prefix(prefix.as_str()).unwrap_or(path);

        match path.split_once('/') {
            Some((first, rest)) if first.contains(':') => rest.to_string(),
            _ => path.to_string(),
        }
    }

    /// Call `getFile`, returning the path the server reports
    async fn get_file(&self, blob_id: &str) -> Result<String> {
        let url = format!(
            "{}/bot{}/getFile?file_id={}",
            self.api_url,
            self.token,
            urlencoding::encode(blob_id)
        );
        debug!(blob_id, "Calling getFile");

        let response = self
            .client
            .get(&url)
            .timeout(self.get_file_timeout)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(blob_id, status = %status, "getFile failed");
            return Err(ResolverError::Status(status.as_u16(), body));
        }

        let parsed: GetFileResponse = serde_json::from_str(&body)
            .map_err(|e| ResolverError::InvalidResponse(format!("{}: {}", e, body)))?;

        parsed.file_path().map(str::to_string).ok_or_else(|| {
            ResolverError::NotAvailable(format!("getFile returned no file path for {}", blob_id))
        })
    }

    /// Stream a file from the file endpoint into `dest`. `None` means 404.
    async fn download(&self, file_path: &str, dest: &Path) -> Result<Option<u64>> {
        let url = format!("{}/file/bot{}/{}", self.api_url, self.token, file_path);
        debug!(file_path, "Downloading from origin");

        let mut response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ResolverError::Status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Error").to_string(),
            ));
        }

        let mut out = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        Ok(Some(written))
    }
}

#[async_trait]
impl OriginResolver for BotApiResolver {
    fn local_path(&self, recorded_path: Option<&str>) -> Option<PathBuf> {
        let recorded = recorded_path.filter(|p| !p.is_empty())?;
        Some(self.token_root().join(self.normalize_path(recorded)))
    }

    async fn fetch(
        &self,
        blob_id: &str,
        recorded_path: Option<&str>,
        dest: &Path,
    ) -> Result<Materialized> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_path = match recorded_path.filter(|p| !p.is_empty()) {
            Some(recorded) => self.normalize_path(recorded),
            None => {
                warn!(blob_id, "No storage path recorded, asking origin for one");
                let reported = self.get_file(blob_id).await?;
                self.normalize_path(&reported)
            }
        };

        if let Some(bytes) = self.download(&file_path, dest).await? {
            info!(blob_id, file_path = %file_path, bytes, "Fetched blob from origin");
            return Ok(Materialized {
                bytes,
                storage_path: Some(file_path),
            });
        }

        info!(blob_id, file_path = %file_path, "Blob not in origin cache, re-materializing");
        let reported = self.get_file(blob_id).await?;
        let storage_path = self.normalize_path(&reported);

        let bytes = if Path::new(&reported).is_absolute() {
            // The server wrote the file to its own disk; copy it from there
            tokio::fs::copy(&reported, dest).await?
        } else {
            self.download(&storage_path, dest).await?.ok_or_else(|| {
                ResolverError::Status(404, format!("{} still missing after getFile", storage_path))
            })?
        };

        info!(blob_id, storage_path = %storage_path, bytes, "Re-materialized blob");
        Ok(Materialized {
            bytes,
            storage_path: Some(storage_path),
        })
    }
}
