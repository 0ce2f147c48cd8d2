//! Media Delivery - bounded video cache with on-demand origin re-fetch
//!
//! Streams catalog videos to browsers, keeping the origin's local storage and
//! the download directory under their disk budgets.

use dir_janitor::{EvictionPolicy, Janitor};
use media_delivery::{
    start_server, DeliveryConfig, DeliveryError, DeliveryPipeline, FallbackProxy, FfmpegToolkit,
    PgVideoCatalog, Result, ServerState, SharedState,
};
use origin_blob_resolver::BotApiResolver;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("media_delivery=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Media Delivery...");

    let config = DeliveryConfig::from_env()?;
    info!("Port: {}", config.port);
    info!("Download dir: {:?}", config.download_dir);
    info!("Origin storage root: {:?}", config.origin_storage_root);

    tokio::fs::create_dir_all(&config.download_dir).await?;

    let catalog = PgVideoCatalog::connect(&config.database_url).await?;
    let tools = Arc::new(FfmpegToolkit::new(&config.ffprobe_bin, &config.ffmpeg_bin));
    let mut pipeline =
        DeliveryPipeline::new(Arc::new(catalog), tools, config.download_dir.clone());

    if let Some(origin) = origin_resolver(&config) {
        pipeline = pipeline.with_origin(Arc::new(origin));
    } else {
        warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_API_URL not set, origin re-fetch disabled");
    }
    if let Some(url) = &config.fallback_proxy_url {
        info!("Fallback proxy: {}", url);
        pipeline = pipeline.with_fallback(FallbackProxy::new(url));
    }

    // One janitor per directory tree we fill
    let origin_janitor = Janitor::new(
        config.origin_storage_root.clone(),
        EvictionPolicy::new()
            .with_max_bytes(config.origin_max_bytes)
            .with_max_files(config.origin_max_files),
        config.origin_sweep_interval,
    )
    .start();
    let download_janitor = Janitor::new(
        config.download_dir.clone(),
        EvictionPolicy::new().with_max_bytes(config.download_max_bytes),
        config.download_sweep_interval,
    )
    .start();

    let state: SharedState = Arc::new(ServerState::new(
        pipeline,
        vec![origin_janitor.reports(), download_janitor.reports()],
    ));

    let served = start_server(state, config.port, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await;

    origin_janitor.stop().await;
    download_janitor.stop().await;

    served.map_err(|e| DeliveryError::Config(format!("Server error: {}", e)))?;
    info!("Media Delivery stopped");
    Ok(())
}

/// The Bot API origin, when both its URL and token are configured
fn origin_resolver(config: &DeliveryConfig) -> Option<BotApiResolver> {
    if !config.origin_enabled() {
        return None;
    }
    let api_url = config.bot_api_url.as_deref()?;
    let token = config.bot_token.as_deref()?;
    info!("Origin: Bot API at {}", api_url);
    Some(BotApiResolver::new(
        api_url,
        token,
        config.origin_storage_root.clone(),
    ))
}
