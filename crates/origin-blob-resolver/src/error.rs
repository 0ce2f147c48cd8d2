//! Error types for the origin blob resolver

use std::fmt;

#[derive(Debug)]
pub enum ResolverError {
    Http(Box<reqwest::Error>),
    Io(Box<std::io::Error>),
    /// The origin answered with an unexpected status code
    Status(u16, String),
    /// The origin has no file path for this blob
    NotAvailable(String),
    InvalidResponse(String),
}

impl ResolverError {
    /// True when retrying later cannot help: the origin no longer knows the blob
    pub fn is_permanent(&self) -> bool {
        match self {
            ResolverError::NotAvailable(_) => true,
            ResolverError::Status(status, _) => matches!(status, 400 | 403 | 404 | 410),
            ResolverError::InvalidResponse(_) => true,
            ResolverError::Http(_) | ResolverError::Io(_) => false,
        }
    }
}

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverError::Http(err) => write!(f, "HTTP error: {}", err),
            ResolverError::Io(err) => write!(f, "IO error: {}", err),
            ResolverError::Status(status, msg) => {
                write!(f, "Origin returned status {}: {}", status, msg)
            }
            ResolverError::NotAvailable(msg) => write!(f, "Blob not available: {}", msg),
            ResolverError::InvalidResponse(msg) => write!(f, "Invalid origin response: {}", msg),
        }
    }
}

impl std::error::Error for ResolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolverError::Http(err) => Some(err.as_ref()),
            ResolverError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ResolverError {
    fn from(err: reqwest::Error) -> Self {
        ResolverError::Http(Box::new(err))
    }
}

impl From<std::io::Error> for ResolverError {
    fn from(err: std::io::Error) -> Self {
        ResolverError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;
