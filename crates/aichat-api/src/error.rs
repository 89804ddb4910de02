//! Strapi client error types.

use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure: connect, timeout, TLS, body read.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with an error body.
    #[error("{name} ({status}): {message}")]
    Strapi {
        status: u16,
        name: String,
        message: String,
    },

    /// 401 from the backend. On a non-auth route the bearer token has
    /// already been dropped when this is returned.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Not signed in")]
    NotSignedIn,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Strapi { status, .. } => Some(*status),
            Self::Unauthorized(_) => Some(401),
            Self::Parse(_) | Self::NotSignedIn => None,
        }
    }
}
