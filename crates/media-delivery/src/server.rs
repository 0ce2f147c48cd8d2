//! HTTP server for video delivery
//!
//! Provides /health and /api/stream/{video_id} endpoints.

use crate::error::{DeliveryError, Result};
use crate::pipeline::DeliveryPipeline;
use crate::types::{HealthResponse, JanitorStatus};
use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use dir_janitor::ReportSlot;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

/// Shared state for the HTTP server
pub struct ServerState {
    pub pipeline: DeliveryPipeline,
    pub janitors: Vec<ReportSlot>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(pipeline: DeliveryPipeline, janitors: Vec<ReportSlot>) -> Self {
        Self {
            pipeline,
            janitors,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stream/{video_id}", get(stream_video))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server, returning once `shutdown` resolves and connections drain
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    let mut janitors = Vec::with_capacity(state.janitors.len());
    for slot in &state.janitors {
        janitors.push(JanitorStatus {
            root: slot.root().to_path_buf(),
            last_sweep: slot.latest().await,
        });
    }

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        started_at: state.started_at,
        janitors,
    })
}

/// Stream a video by its catalog id
async fn stream_video(
    State(state): State<SharedState>,
    Path(video_id): Path<String>,
    request: Request,
) -> Result<Response> {
    let video_id: i64 = video_id
        .parse()
        .map_err(|_| DeliveryError::BadRequest("Invalid video ID".to_string()))?;
    debug!(video_id, "Stream requested");

    state.pipeline.serve(video_id, request).await
}
