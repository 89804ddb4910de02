//! Client-side state containers for AI-character conversations.
//!
//! Each store is a cheap cloneable handle. All mutation goes through the
//! named operations; observers read snapshots and subscribe to the shared
//! [`Dispatcher`] for change events.

pub mod backend;
pub mod characters;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod markdown;
mod ordering;
pub mod settings;
pub mod speech;

pub use backend::{CharacterCatalog, ConversationBackend, IdentityProvider};
pub use characters::{CatalogStatus, CharacterStore};
pub use conversation::{
    ConversationSnapshot, ConversationStore, LoadMoreOutcome, LoadOutcome, LoadStatus, SendState,
    SentExchange,
};
pub use dispatcher::Dispatcher;
pub use error::StoreError;
pub use settings::{SettingsPersistence, SettingsStore};
pub use speech::{SpeechOutput, SpeechRequest};
