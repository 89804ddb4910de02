use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Pagination;

/// Change notifications fanned out to store subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// A different character's conversation became active; prior state was cleared
    ConversationSwitched { character_id: String, session: u64 },

    /// The first page replaced the conversation
    HistoryLoaded {
        character_id: String,
        count: usize,
        pagination: Pagination,
    },

    /// The first page could not be fetched; existing messages were kept
    HistoryLoadFailed { character_id: String, message: String },

    /// An older page was appended to the tail
    MoreHistoryLoaded {
        character_id: String,
        added: usize,
        pagination: Pagination,
    },

    /// An older page could not be fetched; list and cursor are unchanged
    MoreHistoryLoadFailed { character_id: String, message: String },

    /// Optimistic entries for a send were inserted at the head
    MessagePending { character_id: String, client_id: Uuid },

    /// The backend confirmed a send; provisional entries were replaced
    MessageConfirmed { character_id: String, client_id: Uuid },

    /// A send failed; its provisional entries were removed
    MessageRolledBack {
        character_id: String,
        client_id: Uuid,
        reason: String,
    },

    /// The "new message" highlight was lowered
    NewMessageFlagCleared { character_id: String },

    /// The character catalog was (re)loaded
    CharactersLoaded { count: usize },

    /// The selected character changed
    CharacterSelected { character_id: Option<String> },

    /// Conversation settings changed
    SettingsChanged,
}

impl StoreEvent {
    /// Returns the character id if this event is scoped to one conversation.
    pub fn character_id(&self) -> Option<&str> {
        match self {
            Self::ConversationSwitched { character_id, .. }
            | Self::HistoryLoaded { character_id, .. }
            | Self::HistoryLoadFailed { character_id, .. }
            | Self::MoreHistoryLoaded { character_id, .. }
            | Self::MoreHistoryLoadFailed { character_id, .. }
            | Self::MessagePending { character_id, .. }
            | Self::MessageConfirmed { character_id, .. }
            | Self::MessageRolledBack { character_id, .. }
            | Self::NewMessageFlagCleared { character_id } => Some(character_id),
            Self::CharacterSelected { character_id } => character_id.as_deref(),
            Self::CharactersLoaded { .. } | Self::SettingsChanged => None,
        }
    }
}
