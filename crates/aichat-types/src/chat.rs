use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AiCharacter, ConversationRecord, UserProfile};

/// Text shown in the character's reply slot while the backend answers.
pub const THINKING_TEXT: &str = "Thinking…";

/// Identity of a message in the conversation view.
///
/// Server ids come from the backend's `documentId`; the two optimistic
/// variants are both keyed by the client id of the send that created them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MessageId {
    Server(String),
    Provisional(Uuid),
    Placeholder(Uuid),
}

impl MessageId {
    /// Client id of the send this entry belongs to, if it is optimistic.
    pub fn client_id(&self) -> Option<Uuid> {
        match self {
            Self::Provisional(id) | Self::Placeholder(id) => Some(*id),
            Self::Server(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{}", id),
            Self::Provisional(id) => write!(f, "local:{}", id),
            Self::Placeholder(id) => write!(f, "local:{}:reply", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Author {
    User {
        id: String,
        name: String,
        avatar: Option<String>,
    },
    Character {
        id: Option<String>,
        name: String,
        avatar: Option<String>,
    },
}

impl Author {
    pub fn user(profile: &UserProfile) -> Self {
        Self::User {
            id: profile.document_id.clone(),
            name: profile.username.clone(),
            avatar: profile.user_icon_url.clone(),
        }
    }

    pub fn character(character: Option<&AiCharacter>) -> Self {
        match character {
            Some(c) => Self::Character {
                id: Some(c.document_id.clone()),
                name: c.name.clone(),
                avatar: c.cover_url.clone(),
            },
            None => Self::Character {
                id: None,
                name: "AI".to_string(),
                avatar: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::User { name, .. } | Self::Character { name, .. } => name,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub confirmation: ConfirmationState,
}

impl ChatMessage {
    /// The locally-authored half of an optimistic send. It is known-correct,
    /// so it is shown as confirmed right away.
    pub fn provisional(client_id: Uuid, text: &str, user: &UserProfile, at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::Provisional(client_id),
            text: text.to_string(),
            author: Author::user(user),
            created_at: at,
            confirmation: ConfirmationState::Confirmed,
        }
    }

    /// The reply slot of an optimistic send, pending until the backend answers.
    pub fn placeholder(client_id: Uuid, character: Option<&AiCharacter>, at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::Placeholder(client_id),
            text: THINKING_TEXT.to_string(),
            author: Author::character(character),
            created_at: at,
            confirmation: ConfirmationState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.confirmation == ConfirmationState::Pending
    }
}

impl ConversationRecord {
    /// The reply text, if the record carries a non-blank one.
    fn answer_text(&self) -> Option<&str> {
        self.answer.as_deref().filter(|a| !a.trim().is_empty())
    }

    pub fn is_answer(&self) -> bool {
        self.answer_text().is_some()
    }

    /// Map a backend record to its chat view.
    ///
    /// Records with a non-blank answer are the character's reply and take
    /// their time from `updatedAt` (when the reply was written). Everything
    /// else is the user's message, see [`Self::into_user_message`].
    pub fn into_chat_message(
        self,
        current_user: Option<&UserProfile>,
        character: Option<&AiCharacter>,
    ) -> Option<ChatMessage> {
        if !self.is_answer() {
            return self.into_user_message(current_user);
        }
        Some(ChatMessage {
            id: MessageId::Server(self.document_id),
            text: self.answer.unwrap_or_default(),
            author: Author::character(self.ai_character.as_ref().or(character)),
            created_at: self.updated_at,
            confirmation: ConfirmationState::Confirmed,
        })
    }

    /// Map a record as the user's half of an exchange, whatever its answer
    /// field holds. Falls back to `current_user` when the backend did not
    /// populate the relation; `None` means nobody can be credited.
    pub fn into_user_message(self, current_user: Option<&UserProfile>) -> Option<ChatMessage> {
        let author = match (self.user.as_ref(), current_user) {
            (Some(u), _) | (None, Some(u)) => Author::user(u),
            (None, None) => return None,
        };
        Some(ChatMessage {
            id: MessageId::Server(self.document_id),
            text: self.query,
            author,
            created_at: self.created_at.unwrap_or(self.updated_at),
            confirmation: ConfirmationState::Confirmed,
        })
    }
}
