//! Error types for the media delivery service

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use origin_blob_resolver::ResolverError;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum DeliveryError {
    BadRequest(String),
    NotFound(String),
    /// The origin could not produce the blob
    Origin(ResolverError),
    Io(Box<std::io::Error>),
    /// ffprobe or ffmpeg failed
    ToolFailure(String),
    Proxy(Box<reqwest::Error>),
    Database(Box<sqlx::Error>),
    Config(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            DeliveryError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DeliveryError::Origin(err) => write!(f, "Origin error: {}", err),
            DeliveryError::Io(err) => write!(f, "IO error: {}", err),
            DeliveryError::ToolFailure(msg) => write!(f, "Media tool failed: {}", msg),
            DeliveryError::Proxy(err) => write!(f, "Proxy error: {}", err),
            DeliveryError::Database(err) => write!(f, "Database error: {}", err),
            DeliveryError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeliveryError::Origin(err) => Some(err),
            DeliveryError::Io(err) => Some(err.as_ref()),
            DeliveryError::Proxy(err) => Some(err.as_ref()),
            DeliveryError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            DeliveryError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            DeliveryError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            DeliveryError::Origin(err) => {
                tracing::error!(error = %err, "Origin fetch failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to download video from origin: {}", err),
                )
            }
            DeliveryError::ToolFailure(msg) => {
                tracing::error!(error = %msg, "Media tool failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to transcode video".into(),
                )
            }
            DeliveryError::Proxy(err) => {
                tracing::error!(error = %err, "Fallback proxy failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to stream video: {}", err),
                )
            }
            other => {
                tracing::error!(error = %other, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<ResolverError> for DeliveryError {
    fn from(err: ResolverError) -> Self {
        DeliveryError::Origin(err)
    }
}

impl From<std::io::Error> for DeliveryError {
    fn from(err: std::io::Error) -> Self {
        DeliveryError::Io(Box::new(err))
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Proxy(Box::new(err))
    }
}

impl From<sqlx::Error> for DeliveryError {
    fn from(err: sqlx::Error) -> Self {
        DeliveryError::Database(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for DeliveryError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        DeliveryError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
