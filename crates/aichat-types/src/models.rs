use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user as returned by the backend's users-permissions plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub user_icon_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

fn default_provider() -> String {
    "local".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiCharacter {
    pub id: i64,
    pub document_id: String,
    pub name: String,
    #[serde(default)]
    pub introduce: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Voice agent bound to this character on the real-time voice service.
    #[serde(default)]
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// One persisted exchange entry of a chat conversation.
///
/// The backend stores the user's query and the character's answer as two
/// records: a record without `answer` is a user message, a record with an
/// `answer` is the character's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: i64,
    pub document_id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default, rename = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, rename = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default, rename = "ai_character")]
    pub ai_character: Option<AiCharacter>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, rename = "message_status")]
    pub message_status: Option<String>,
}

/// Page cursor reported by the backend alongside list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub page_count: u32,
    pub total: u32,
}

impl Pagination {
    pub fn has_more(&self) -> bool {
        self.page < self.page_count
    }

    pub fn next_page(&self) -> u32 {
        self.page + 1
    }
}
