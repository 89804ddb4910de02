//! Strapi HTTP client.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use aichat_types::api::{
    AuthResponse, DataEnvelope, LoginRequest, ProfileUpdate, RegisterRequest, StrapiErrorBody,
};
use aichat_types::models::UserProfile;

use crate::error::{ApiError, ApiResult};
use crate::query::Query;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

/// Client for the backend's REST API. Cheap to clone; clones share the
/// bearer token and the unauthorized handler.
#[derive(Clone)]
pub struct StrapiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Client,
    /// Base URL plus `/api`, without a trailing slash.
    api_url: String,
    token: RwLock<Option<String>>,
    on_unauthorized: RwLock<Option<UnauthorizedHandler>>,
}

impl StrapiClient {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                api_url: format!("{}/api", base_url.trim_end_matches('/')),
                token: RwLock::new(None),
                on_unauthorized: RwLock::new(None),
            }),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.inner.api_url
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.inner.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn token(&self) -> Option<String> {
        self.inner
            .token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Called after a 401 on any non-auth route, once the token is dropped.
    pub fn on_unauthorized(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .on_unauthorized
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(handler));
    }

    // -- Auth --

    pub async fn login(&self, identifier: &str, password: &str) -> ApiResult<AuthResponse> {
        let body = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        self.send_json(Method::POST, "/auth/local", &body).await
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> ApiResult<AuthResponse> {
        let body = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.send_json(Method::POST, "/auth/local/register", &body)
            .await
    }

    /// Exchange a third-party access token for a session.
    pub async fn authenticate_provider(
        &self,
        provider: &str,
        access_token: &str,
    ) -> ApiResult<AuthResponse> {
        let path = format!("/auth/{}/callback", urlencoding::encode(provider));
        let query = Query::new().param("access_token", access_token);
        self.get(&path, &query).await
    }

    // -- Users --

    pub async fn fetch_me(&self) -> ApiResult<UserProfile> {
        self.get("/users/me", &Query::new().populate_all()).await
    }

    pub async fn update_me(&self, update: &ProfileUpdate) -> ApiResult<UserProfile> {
        self.send_json(Method::PUT, "/users/me", &DataEnvelope { data: update })
            .await
    }

    // -- Plumbing --

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str, query: &Query) -> ApiResult<T> {
        let response = self.request(Method::GET, path, query).send().await?;
        self.handle_response(path, response).await
    }

    pub(crate) async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let response = self
            .request(method, path, &Query::new())
            .json(body)
            .send()
            .await?;
        self.handle_response(path, response).await
    }

    fn request(&self, method: Method, path: &str, query: &Query) -> RequestBuilder {
        let url = format!("{}{}", self.inner.api_url, path);
        debug!(%method, %url, params = query.pairs().len(), "Strapi request");

        let mut builder = self.inner.http.request(method, url);
        if !query.is_empty() {
            builder = builder.query(query.pairs());
        }
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Handle response and parse JSON or error.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> ApiResult<T> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ApiError::Parse(format!("{} response: {}", path, e)));
        }

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<StrapiErrorBody>(&text)
            .map(|body| body.error)
            .ok();
        let message = detail
            .as_ref()
            .map(|d| d.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

        if status == StatusCode::UNAUTHORIZED {
            // A failed login is an ordinary 401 and must not sign anyone out.
            if !path.starts_with("/auth") {
                warn!(path, "Unauthorized on a protected route, dropping token");
                self.set_token(None);
                let handler = self
                    .inner
                    .on_unauthorized
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone();
                if let Some(handler) = handler {
                    handler();
                }
            }
            return Err(ApiError::Unauthorized(message));
        }

        Err(ApiError::Strapi {
            status: status.as_u16(),
            name: detail.map(|d| d.name).unwrap_or_default(),
            message,
        })
    }
}
