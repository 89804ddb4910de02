use std::sync::{Arc, RwLock, Weak};

use tracing::{error, info, warn};

use aichat_db::Database;
use aichat_store::IdentityProvider;
use aichat_types::api::{AuthResponse, ProfileUpdate};
use aichat_types::models::UserProfile;

use crate::client::StrapiClient;
use crate::error::{ApiError, ApiResult};

/// The signed-in user and their bearer token.
///
/// The token lives on the shared [`StrapiClient`]; the profile lives here.
/// When a database is attached, both are persisted so a later process can
/// `restore` the session.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: StrapiClient,
    db: Option<Arc<Database>>,
    user: RwLock<Option<UserProfile>>,
}

impl AuthSession {
    pub fn new(client: StrapiClient, db: Option<Arc<Database>>) -> Self {
        let inner = Arc::new(SessionInner {
            client,
            db,
            user: RwLock::new(None),
        });

        // The client has already dropped the token when this runs.
        let weak: Weak<SessionInner> = Arc::downgrade(&inner);
        inner.client.on_unauthorized(move || {
            if let Some(inner) = weak.upgrade() {
                warn!("Session rejected by the backend, signing out");
                inner.set_user(None);
                inner.forget_stored_session();
            }
        });

        Self { inner }
    }

    pub fn client(&self) -> &StrapiClient {
        &self.inner.client
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.client.token().is_some() && self.inner.user().is_some()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ApiResult<UserProfile> {
        let auth = self.inner.client.login(email, password).await?;
        Ok(self.establish(auth).await)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> ApiResult<UserProfile> {
        let auth = self.inner.client.register(username, email, password).await?;
        if auth.jwt.is_empty() {
            return Err(ApiError::Parse("no token in registration response".into()));
        }
        Ok(self.establish(auth).await)
    }

    pub async fn sign_in_with_provider(
        &self,
        provider: &str,
        access_token: &str,
    ) -> ApiResult<UserProfile> {
        let auth = self
            .inner
            .client
            .authenticate_provider(provider, access_token)
            .await?;
        Ok(self.establish(auth).await)
    }

    pub async fn sign_out(&self) {
        self.inner.client.set_token(None);
        self.inner.set_user(None);
        if let Some(db) = self.inner.db.clone() {
            run_blocking("clear_session", move || db.clear_session()).await;
        }
        info!("Signed out");
    }

    /// Re-read the profile from the backend.
    pub async fn refresh_profile(&self) -> ApiResult<UserProfile> {
        if self.inner.client.token().is_none() {
            return Err(ApiError::NotSignedIn);
        }
        let user = self.inner.client.fetch_me().await?;
        self.inner.set_user(Some(user.clone()));
        self.persist().await;
        Ok(user)
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> ApiResult<UserProfile> {
        if self.inner.client.token().is_none() {
            return Err(ApiError::NotSignedIn);
        }
        let user = self.inner.client.update_me(&update).await?;
        self.inner.set_user(Some(user.clone()));
        self.persist().await;
        Ok(user)
    }

    /// Resume a persisted session and re-validate it against the backend.
    ///
    /// Returns whether a user is signed in afterwards. A session the
    /// backend no longer accepts leaves the user signed out; that is not
    /// an error.
    pub async fn restore(&self) -> bool {
        let Some(db) = self.inner.db.clone() else {
            return false;
        };
        let stored = run_blocking("load_session", move || db.load_session())
            .await
            .flatten();
        let Some(stored) = stored else {
            return false;
        };

        self.inner.client.set_token(Some(stored.jwt));
        match self.inner.client.fetch_me().await {
            Ok(user) => {
                info!(user = %user.username, "Restored session");
                self.inner.set_user(Some(user));
                self.persist().await;
                true
            }
            Err(e) => {
                warn!("Stored session is no longer valid: {}", e);
                self.inner.client.set_token(None);
                self.inner.set_user(None);
                false
            }
        }
    }

    /// Forget the in-memory profile without touching the token or storage.
    pub fn reset_user(&self) {
        self.inner.set_user(None);
    }

    async fn establish(&self, auth: AuthResponse) -> UserProfile {
        info!(user = %auth.user.username, "Signed in");
        self.inner.client.set_token(Some(auth.jwt));
        self.inner.set_user(Some(auth.user.clone()));
        self.persist().await;
        auth.user
    }

    async fn persist(&self) {
        let (Some(db), Some(token), Some(user)) = (
            self.inner.db.clone(),
            self.inner.client.token(),
            self.inner.user(),
        ) else {
            return;
        };
        run_blocking("save_session", move || db.save_session(&token, &user)).await;
    }
}

impl IdentityProvider for AuthSession {
    fn current_user(&self) -> Option<UserProfile> {
        self.inner.user()
    }
}

impl SessionInner {
    fn user(&self) -> Option<UserProfile> {
        self.user.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_user(&self, user: Option<UserProfile>) {
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = user;
    }

    /// Fire-and-forget removal of the stored session; callable from sync code
    /// running inside the runtime.
    fn forget_stored_session(&self) {
        if let Some(db) = self.db.clone() {
            tokio::task::spawn_blocking(move || {
                if let Err(e) = db.clear_session() {
                    error!("DB clear_session error: {}", e);
                }
            });
        }
    }
}

/// Run a database call off the async threads. Failures are logged; local
/// persistence never fails an authentication call.
async fn run_blocking<T, F>(what: &str, f: F) -> Option<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("DB {} error: {}", what, e);
            None
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            None
        }
    }
}
