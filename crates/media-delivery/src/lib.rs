//! Media delivery library
//!
//! Serves catalog videos from the origin's local storage, re-fetching evicted
//! blobs on demand and transcoding what browsers cannot play.

pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod media_tools;
pub mod pipeline;
pub mod proxy;
pub mod server;
pub mod session;
pub mod single_flight;
pub mod transcode;
pub mod types;

#[cfg(test)]
mod test_support;

pub use catalog::{PgVideoCatalog, VideoCatalog};
pub use codec::{CodecPair, Playability};
pub use config::DeliveryConfig;
pub use error::{DeliveryError, Result};
pub use media_tools::{FfmpegToolkit, MediaToolkit, StreamKind};
pub use pipeline::DeliveryPipeline;
pub use proxy::FallbackProxy;
pub use server::{create_router, start_server, ServerState, SharedState};
pub use transcode::TranscodeCache;
pub use types::*;
