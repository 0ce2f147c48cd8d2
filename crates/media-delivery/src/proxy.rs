//! Fallback proxy used when no origin adapter is configured

use crate::error::{DeliveryError, Result};
use axum::body::Body;
use axum::http::header::{CONNECTION, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use reqwest::Client;
use tracing::{debug, warn};

/// Forwards stream requests to another delivery service
pub struct FallbackProxy {
    client: Client,
    base_url: String,
}

impl FallbackProxy {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn target_url(&self, video_id: i64) -> String {
        format!("{}/download/{}", self.base_url, video_id)
    }

    /// Relay the request upstream and stream the answer back unchanged
    pub async fn forward(
        &self,
        video_id: i64,
        method: Method,
        headers: &HeaderMap,
    ) -> Result<Response> {
        let url = self.target_url(video_id);
        debug!(video_id, url = %url, "Proxying stream request");

        let mut forwarded = headers.clone();
        forwarded.remove(HOST);

        let upstream = self
            .client
            .request(method, &url)
            .headers(forwarded)
            .send()
            .await?;

        let status = upstream.status();
        if status.is_server_error() {
            warn!(video_id, status = %status, "Fallback proxy returned an error");
        }

        let mut builder = Response::builder().status(status);
        for (name, value) in upstream.headers() {
            if name == TRANSFER_ENCODING || name == CONNECTION {
                continue;
            }
            builder = builder.header(name, value);
        }

        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| DeliveryError::Io(Box::new(std::io::Error::other(e))))
    }
}
