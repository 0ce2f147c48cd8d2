//! Origin blob resolver
//!
//! Locates previously uploaded media blobs on the origin's local disk and,
//! when they have been evicted, asks the origin to re-materialize them and
//! copies the bytes to a caller-chosen path.

pub mod bot_api;
pub mod error;
pub mod resolver;
pub mod types;

pub use bot_api::BotApiResolver;
pub use error::{ResolverError, Result};
pub use resolver::{Materialized, OriginResolver};
pub use types::{GetFileResponse, OriginFile};
