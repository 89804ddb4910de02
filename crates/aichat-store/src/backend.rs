//! Collaborators the stores read from. Implementations live outside this
//! crate (the HTTP client, the authenticated session) or in tests.

use anyhow::Result;
use async_trait::async_trait;

use aichat_types::api::{NewMessage, StrapiPage};
use aichat_types::models::{AiCharacter, ConversationRecord, UserProfile};

/// Remote source of truth for conversation history.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// One page of the current user's records with `character_id`, newest first.
    async fn list_conversations(
        &self,
        character_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<StrapiPage<ConversationRecord>>;

    /// Persist a user message and return `[user query record, answer record]`.
    async fn create_message(
        &self,
        character_id: &str,
        message: NewMessage,
    ) -> Result<[ConversationRecord; 2]>;
}

#[async_trait]
pub trait CharacterCatalog: Send + Sync {
    async fn list_characters(&self) -> Result<Vec<AiCharacter>>;
}

/// Who is signed in right now. Read-only from the stores' point of view.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserProfile>;
}
