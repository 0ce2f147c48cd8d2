//! Per-request delivery: local hit, origin re-fetch, codec gate, transcode, serve

use crate::catalog::VideoCatalog;
use crate::codec::{self, Playability};
use crate::error::{DeliveryError, Result};
use crate::media_tools::MediaToolkit;
use crate::proxy::FallbackProxy;
use crate::session::{StreamSession, TransientFile};
use crate::single_flight::KeyedLocks;
use crate::transcode::TranscodeCache;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures::StreamExt;
use origin_blob_resolver::OriginResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};

enum Attempt {
    Served(Response),
    /// The file disappeared before it could be opened
    Vanished(StreamSession),
}

pub struct DeliveryPipeline {
    catalog: Arc<dyn VideoCatalog>,
    origin: Option<Arc<dyn OriginResolver>>,
    tools: Arc<dyn MediaToolkit>,
    transcodes: TranscodeCache,
    fallback: Option<FallbackProxy>,
    scratch_dir: PathBuf,
    refetch_locks: KeyedLocks<i64>,
}

impl DeliveryPipeline {
    /// `scratch_dir` holds transient fetches and transcoded renditions
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        tools: Arc<dyn MediaToolkit>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            origin: None,
            transcodes: TranscodeCache::new(scratch_dir.clone(), Arc::clone(&tools)),
            tools,
            fallback: None,
            scratch_dir,
            refetch_locks: KeyedLocks::new(),
        }
    }

    pub fn with_origin(mut self, origin: Arc<dyn OriginResolver>) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_fallback(mut self, proxy: FallbackProxy) -> Self {
        self.fallback = Some(proxy);
        self
    }

    pub fn transcodes(&self) -> &TranscodeCache {
        &self.transcodes
    }

    /// Serve one playback request for `video_id`
    pub async fn serve(&self, video_id: i64, request: Request<Body>) -> Result<Response> {
        let (parts, _body) = request.into_parts();

        let video = self
            .catalog
            .resolve_video(video_id)
            .await?
            .ok_or_else(|| DeliveryError::NotFound("Video not found".to_string()))?;
        let blob_id = video
            .blob_id()
            .ok_or_else(|| DeliveryError::NotFound("Video file ID not available".to_string()))?
            .to_string();

        let Some(origin) = self.origin.as_deref() else {
            return match &self.fallback {
                Some(proxy) => proxy.forward(video_id, parts.method, &parts.headers).await,
                None => Err(DeliveryError::Config(
                    "no origin adapter or fallback proxy configured".to_string(),
                )),
            };
        };

        let mut session = StreamSession::new(video_id);
        let mut storage_path = video.storage_path().map(str::to_string);

        if let Some(local) = present_locally(origin, &blob_id, storage_path.as_deref()).await {
            debug!(video_id, path = ?local, "Serving from origin storage");
            match self.serve_local(session, &local, &parts).await? {
                Attempt::Served(response) => return Ok(response),
                Attempt::Vanished(s) => {
                    info!(video_id, path = ?local, "File vanished before serving, re-fetching");
                    session = s;
                }
            }
        }

        let guard = self.refetch_locks.acquire(video_id).await;

        // A request ahead of us may have re-materialized the blob already
        storage_path = self.refreshed_storage_path(video_id, storage_path).await;
        if let Some(local) = present_locally(origin, &blob_id, storage_path.as_deref()).await {
            debug!(video_id, path = ?local, "Blob re-materialized by another request");
            match self.serve_local(session, &local, &parts).await? {
                Attempt::Served(response) => return Ok(response),
                Attempt::Vanished(s) => session = s,
            }
        }

        let transient = TransientFile::create(&self.scratch_dir, video_id)?;
        info!(video_id, blob_id = %blob_id, dest = ?transient.path(), "Fetching blob from origin");
        let materialized = origin
            .fetch(&blob_id, storage_path.as_deref(), transient.path())
            .await?;
        debug!(video_id, bytes = materialized.bytes, "Blob fetched");

        if let Some(fresh) = materialized.storage_path.as_deref() {
            if storage_path.as_deref() != Some(fresh) {
                if let Err(e) = self.catalog.record_storage_path(video_id, fresh).await {
                    warn!(video_id, error = %e, "Failed to record new storage path");
                }
            }
        }
        drop(guard);

        let path = session.attach(transient).to_path_buf();
        match self.serve_local(session, &path, &parts).await? {
            Attempt::Served(response) => Ok(response),
            Attempt::Vanished(_) => Err(DeliveryError::Io(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("fetched file {} disappeared", path.display()),
            )))),
        }
    }

    async fn refreshed_storage_path(&self, video_id: i64, current: Option<String>) -> Option<String> {
        match self.catalog.resolve_video(video_id).await {
            Ok(Some(video)) => video.storage_path().map(str::to_string).or(current),
            Ok(None) => current,
            Err(e) => {
                warn!(video_id, error = %e, "Failed to refresh storage path");
                current
            }
        }
    }

    /// Pass `path` through the codec gate and stream it, honoring `Range`
    async fn serve_local(
        &self,
        session: StreamSession,
        path: &Path,
        parts: &Parts,
    ) -> Result<Attempt> {
        let needs_transcode = match codec::classify(self.tools.as_ref(), path).await {
            Playability::Direct(_) => false,
            Playability::NeedsTranscode(_) => true,
        };

        // A rendition evicted before it was opened is rebuilt once from the same source
        let mut rebuilds_left = usize::from(needs_transcode);
        let response = loop {
            let file = if needs_transcode {
                match self.rendition(session.video_id(), path).await? {
                    Some(rendition) => rendition,
                    None => return Ok(Attempt::Vanished(session)),
                }
            } else {
                path.to_path_buf()
            };

            let response = serve_file(&file, parts).await;
            if response.status() != StatusCode::NOT_FOUND {
                break response;
            }
            if rebuilds_left == 0 || !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Ok(Attempt::Vanished(session));
            }
            debug!(path = ?file, "Rendition evicted before serving, rebuilding");
            rebuilds_left -= 1;
        };

        // The session lives as long as the body; dropping it removes any transient file
        let (head, body) = response.into_parts();
        let stream = body.into_data_stream().map(move |chunk| {
            let _ = &session;
            chunk
        });
        Ok(Attempt::Served(Response::from_parts(
            head,
            Body::from_stream(stream),
        )))
    }

    /// The transcoded rendition of `source`, or `None` if the source vanished
    async fn rendition(&self, video_id: i64, source: &Path) -> Result<Option<PathBuf>> {
        match self.transcodes.get_or_create(video_id, source).await {
            Ok(rendition) => Ok(Some(rendition)),
            Err(e) if !tokio::fs::try_exists(source).await.unwrap_or(false) => {
                debug!(path = ?source, error = %e, "Source vanished during transcode");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Serve `file` for the original request, honoring `Range` and conditional headers
async fn serve_file(file: &Path, parts: &Parts) -> Response {
    let mut request = Request::new(Body::empty());
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.headers_mut() = parts.headers.clone();

    ServeFile::new(file)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {})
        .map(Body::new)
}

async fn present_locally(
    origin: &dyn OriginResolver,
    blob_id: &str,
    storage_path: Option<&str>,
) -> Option<PathBuf> {
    if !origin.probe_exists(blob_id, storage_path).await {
        return None;
    }
    origin.local_path(storage_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeOrigin, FakeTools, MemoryCatalog};
    use axum::http::header;
    use axum::response::IntoResponse;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const PAYLOAD: &[u8] = b"0123456789abcdef";

    struct Fixture {
        origin_root: TempDir,
        scratch: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                origin_root: tempdir().unwrap(),
                scratch: tempdir().unwrap(),
            }
        }

        fn place(&self, rel: &str, bytes: &[u8]) -> PathBuf {
            let path = self.origin_root.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, bytes).unwrap();
            path
        }

        fn pipeline(
            &self,
            catalog: MemoryCatalog,
            origin: Arc<FakeOrigin>,
            tools: Arc<FakeTools>,
        ) -> DeliveryPipeline {
            DeliveryPipeline::new(Arc::new(catalog), tools, self.scratch.path().to_path_buf())
                .with_origin(origin)
        }

        fn stream_files(&self) -> usize {
            std::fs::read_dir(self.scratch.path())
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("stream-"))
                .count()
        }
    }

    fn get(range: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/stream/1");
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_compatible_file_served_directly() {
        let fx = Fixture::new();
        fx.place("videos/file_1.mp4", PAYLOAD);
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), b"unused"));
        let tools = Arc::new(FakeTools::new("h264", "aac"));
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/file_1.mp4"));
        let pipeline = fx.pipeline(catalog, origin.clone(), tools.clone());

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, PAYLOAD);
        assert_eq!(tools.transcode_count(), 0);
        assert_eq!(origin.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_range_request_is_partial() {
        let fx = Fixture::new();
        fx.place("videos/file_1.mp4", PAYLOAD);
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), b"unused"));
        let tools = Arc::new(FakeTools::new("vp9", "opus"));
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/file_1.mp4"));
        let pipeline = fx.pipeline(catalog, origin, tools);

        let response = pipeline.serve(1, get(Some("bytes=0-3"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes 0-3/16"
        );
        assert_eq!(body_bytes(response).await, b"0123");
    }

    #[tokio::test]
    async fn test_incompatible_audio_is_transcoded_once() {
        let fx = Fixture::new();
        fx.place("videos/file_1.mkv", PAYLOAD);
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), b"unused"));
        let tools = Arc::new(FakeTools::new("h264", "ac3"));
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/file_1.mkv"));
        let pipeline = fx.pipeline(catalog, origin, tools.clone());

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"transcoded");
        assert_eq!(tools.transcode_count(), 1);
        assert!(pipeline.transcodes().cached_path(1).exists());

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(body_bytes(response).await, b"transcoded");
        assert_eq!(tools.transcode_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_routes_through_transcode() {
        let fx = Fixture::new();
        fx.place("videos/file_1.avi", PAYLOAD);
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), b"unused"));
        let tools = Arc::new(FakeTools::new("h264", "aac").failing_probe());
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/file_1.avi"));
        let pipeline = fx.pipeline(catalog, origin, tools.clone());

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(body_bytes(response).await, b"transcoded");
        assert_eq!(tools.transcode_count(), 1);
    }

    #[tokio::test]
    async fn test_source_vanishing_during_transcode_refetches() {
        let fx = Fixture::new();
        let local = fx.place("videos/file_1.mkv", b"stale");
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), PAYLOAD));
        let tools = Arc::new(FakeTools::new("h264", "ac3").deleting_when_inspected(&local));
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/file_1.mkv"));
        let pipeline = fx.pipeline(catalog, origin.clone(), tools.clone());

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"transcoded");
        assert_eq!(origin.fetch_count(), 1);
        // The first attempt failed on the missing source, the second used the fetched copy
        assert_eq!(tools.transcode_count(), 2);
        assert_eq!(fx.stream_files(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_evicted_rendition_is_rebuilt_without_refetch() {
        let fx = Fixture::new();
        fx.place("videos/file_1.mkv", PAYLOAD);
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), b"unused"));
        let tools = Arc::new(FakeTools::new("h264", "ac3").with_dangling_renditions(1));
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/file_1.mkv"));
        let pipeline = fx.pipeline(catalog, origin.clone(), tools.clone());

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"transcoded");
        assert_eq!(tools.transcode_count(), 2);
        assert_eq!(origin.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_video_is_not_found() {
        let fx = Fixture::new();
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), PAYLOAD));
        let tools = Arc::new(FakeTools::new("h264", "aac"));
        let pipeline = fx.pipeline(MemoryCatalog::default(), origin, tools);

        let err = pipeline.serve(99, get(None)).await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotFound(ref m) if m == "Video not found"));
    }

    #[tokio::test]
    async fn test_missing_blob_id_is_not_found() {
        let fx = Fixture::new();
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), PAYLOAD));
        let tools = Arc::new(FakeTools::new("h264", "aac"));
        let catalog = MemoryCatalog::default()
            .with_video(1, None, None)
            .with_video(2, Some(""), None);
        let pipeline = fx.pipeline(catalog, origin.clone(), tools);

        for id in [1, 2] {
            let err = pipeline.serve(id, get(None)).await.unwrap_err();
            assert!(
                matches!(err, DeliveryError::NotFound(ref m) if m == "Video file ID not available")
            );
        }
        assert_eq!(origin.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_local_miss_refetches_and_cleans_up_after_body() {
        let fx = Fixture::new();
        let origin = Arc::new(
            FakeOrigin::new(fx.origin_root.path(), PAYLOAD).rematerializing_at("videos/file_7.mp4"),
        );
        let tools = Arc::new(FakeTools::new("h264", "aac"));
        let catalog = Arc::new(
            MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/old_1.mp4")),
        );
        let pipeline = DeliveryPipeline::new(
            catalog.clone(),
            tools,
            fx.scratch.path().to_path_buf(),
        )
        .with_origin(origin.clone());

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(origin.fetch_count(), 1);
        assert_eq!(fx.stream_files(), 1);

        assert_eq!(body_bytes(response).await, PAYLOAD);
        assert_eq!(fx.stream_files(), 0);
        assert_eq!(catalog.writes(), vec![(1, "videos/file_7.mp4".to_string())]);
    }

    #[tokio::test]
    async fn test_dropped_body_removes_transient_file() {
        let fx = Fixture::new();
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), PAYLOAD));
        let tools = Arc::new(FakeTools::new("h264", "aac"));
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), None);
        let pipeline = fx.pipeline(catalog, origin.clone(), tools);

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(fx.stream_files(), 1);

        drop(response);
        assert_eq!(fx.stream_files(), 0);
        assert_eq!(origin.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_origin_failure_is_internal_error_with_detail() {
        let fx = Fixture::new();
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), PAYLOAD).failing_with(502));
        let tools = Arc::new(FakeTools::new("h264", "aac"));
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/gone.mp4"));
        let pipeline = fx.pipeline(catalog, origin.clone(), tools);

        let err = pipeline.serve(1, get(None)).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Origin(_)));
        assert_eq!(origin.fetch_count(), 1);
        assert_eq!(fx.stream_files(), 0);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to download video from origin"));
    }

    #[tokio::test]
    async fn test_file_vanishing_after_check_refetches_once() {
        let fx = Fixture::new();
        let local = fx.place("videos/file_1.mp4", b"stale");
        let origin = Arc::new(FakeOrigin::new(fx.origin_root.path(), PAYLOAD));
        let tools = Arc::new(FakeTools::new("h264", "aac").deleting_when_inspected(&local));
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), Some("videos/file_1.mp4"));
        let pipeline = fx.pipeline(catalog, origin.clone(), tools);

        let response = pipeline.serve(1, get(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, PAYLOAD);
        assert_eq!(origin.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let fx = Fixture::new();
        let origin = Arc::new(
            FakeOrigin::new(fx.origin_root.path(), PAYLOAD)
                .rematerializing_at("videos/file_5.mp4")
                .with_delay(Duration::from_millis(50)),
        );
        let tools = Arc::new(FakeTools::new("h264", "aac"));
        let catalog = MemoryCatalog::default().with_video(5, Some("blob-5"), None);
        let pipeline = Arc::new(fx.pipeline(catalog, origin.clone(), tools));

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    let response = pipeline.serve(5, get(None)).await.unwrap();
                    body_bytes(response).await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), PAYLOAD);
        }
        assert_eq!(origin.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_no_origin_and_no_proxy_is_internal_error() {
        let fx = Fixture::new();
        let catalog = MemoryCatalog::default().with_video(1, Some("blob-1"), None);
        let pipeline = DeliveryPipeline::new(
            Arc::new(catalog),
            Arc::new(FakeTools::new("h264", "aac")),
            fx.scratch.path().to_path_buf(),
        );

        let err = pipeline.serve(1, get(None)).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Config(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
