use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("character id must not be empty")]
    EmptyCharacterId,

    #[error("message text must not be empty")]
    EmptyMessage,

    #[error("no user is signed in")]
    NotSignedIn,

    #[error("conversation with character '{0}' is not active")]
    NotActive(String),

    #[error("client message id {0} is already tracked in this conversation")]
    DuplicateClientId(Uuid),

    #[error("backend reply is malformed: {0}")]
    MalformedReply(String),

    #[error("backend request failed: {0:#}")]
    Backend(anyhow::Error),
}

impl StoreError {
    /// True when the failure came from the backend and a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}
