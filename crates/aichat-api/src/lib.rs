//! HTTP client for the Strapi content backend, plus the authenticated
//! session and the adapter that serves the stores from it.

pub mod auth;
pub mod client;
pub mod conversations;
pub mod error;
pub mod query;

pub use auth::AuthSession;
pub use client::{DEFAULT_TIMEOUT, StrapiClient};
pub use conversations::StrapiBackend;
pub use error::{ApiError, ApiResult};
