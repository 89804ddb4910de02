//! Character and conversation endpoints, and their store-facing adapter.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use aichat_store::{CharacterCatalog, ConversationBackend, IdentityProvider};
use aichat_types::api::{CreateMessageBody, DataEnvelope, NewMessage, StrapiPage, StrapiResponse};
use aichat_types::models::{AiCharacter, ConversationRecord};

use crate::client::StrapiClient;
use crate::error::{ApiError, ApiResult};
use crate::query::Query;

impl StrapiClient {
    pub async fn list_characters(&self) -> ApiResult<Vec<AiCharacter>> {
        let response: StrapiResponse<Vec<AiCharacter>> = self
            .get("/ai-characters", &Query::new().populate_all())
            .await?;
        Ok(response.data)
    }

    /// One page of `user_id`'s records with `character_id`, newest first.
    pub async fn list_conversations(
        &self,
        character_id: &str,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> ApiResult<StrapiPage<ConversationRecord>> {
        let query = Query::new()
            .filter_eq(&["ai_character", "documentId"], character_id)
            .filter_eq(&["user", "documentId"], user_id)
            .param("sort", "createdAt:desc")
            .page(page, page_size)
            .populate_all();
        self.get("/chat-conversations", &query).await
    }

    /// Send a user message; the backend answers with the stored query
    /// record followed by the character's answer record.
    pub async fn create_message(
        &self,
        character_id: &str,
        message: NewMessage,
    ) -> ApiResult<[ConversationRecord; 2]> {
        let body = DataEnvelope {
            data: CreateMessageBody {
                character_id: character_id.to_string(),
                query: message.query,
                message_id: message.message_id,
            },
        };
        let response: StrapiResponse<Vec<ConversationRecord>> = self
            .send_json(Method::POST, "/chat-conversations/create-message", &body)
            .await?;

        let count = response.data.len();
        response.data.try_into().map_err(|_| {
            ApiError::Parse(format!(
                "create-message returned {} records, expected 2",
                count
            ))
        })
    }
}

/// Serves the stores from the backend on behalf of the signed-in user.
#[derive(Clone)]
pub struct StrapiBackend {
    client: StrapiClient,
    identity: Arc<dyn IdentityProvider>,
}

impl StrapiBackend {
    pub fn new(client: StrapiClient, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { client, identity }
    }
}

#[async_trait]
impl ConversationBackend for StrapiBackend {
    async fn list_conversations(
        &self,
        character_id: &str,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<StrapiPage<ConversationRecord>> {
        let user = self.identity.current_user().ok_or(ApiError::NotSignedIn)?;
        debug!(character_id, page, page_size, "Listing conversation page");
        Ok(self
            .client
            .list_conversations(character_id, &user.document_id, page, page_size)
            .await?)
    }

    async fn create_message(
        &self,
        character_id: &str,
        message: NewMessage,
    ) -> anyhow::Result<[ConversationRecord; 2]> {
        Ok(self.client.create_message(character_id, message).await?)
    }
}

#[async_trait]
impl CharacterCatalog for StrapiBackend {
    async fn list_characters(&self) -> anyhow::Result<Vec<AiCharacter>> {
        Ok(self.client.list_characters().await?)
    }
}
