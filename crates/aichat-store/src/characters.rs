use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, error, info};

use aichat_types::events::StoreEvent;
use aichat_types::models::AiCharacter;

use crate::backend::CharacterCatalog;
use crate::dispatcher::Dispatcher;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStatus {
    #[default]
    NotStarted,
    Loading,
    Success,
    Error,
}

/// The list of characters a user can talk to, and which one is selected.
#[derive(Clone)]
pub struct CharacterStore {
    inner: Arc<CharacterInner>,
}

struct CharacterInner {
    catalog: Arc<dyn CharacterCatalog>,
    dispatcher: Dispatcher,
    state: Mutex<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    characters: Vec<AiCharacter>,
    selected: Option<AiCharacter>,
    status: CatalogStatus,
    last_error: Option<String>,
}

impl CharacterStore {
    pub fn new(catalog: Arc<dyn CharacterCatalog>, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(CharacterInner {
                catalog,
                dispatcher,
                state: Mutex::new(CatalogState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load the catalog. Returns `Ok(false)` if a load was already running.
    ///
    /// The current selection survives a reload if the character still
    /// exists; otherwise the first character is selected.
    pub async fn fetch_characters(&self) -> Result<bool, StoreError> {
        {
            let mut state = self.state();
            if state.status == CatalogStatus::Loading {
                debug!("Character catalog already loading");
                return Ok(false);
            }
            state.status = CatalogStatus::Loading;
            state.last_error = None;
        }

        let result = self.inner.catalog.list_characters().await;

        let mut state = self.state();
        match result {
            Ok(characters) => {
                let selected = state
                    .selected
                    .as_ref()
                    .and_then(|s| characters.iter().find(|c| c.document_id == s.document_id))
                    .or_else(|| characters.first())
                    .cloned();
                info!("Loaded {} characters", characters.len());

                let count = characters.len();
                state.characters = characters;
                state.status = CatalogStatus::Success;
                let changed = state.selected.as_ref().map(|c| &c.document_id)
                    != selected.as_ref().map(|c| &c.document_id);
                state.selected = selected;

                self.inner
                    .dispatcher
                    .broadcast(StoreEvent::CharactersLoaded { count });
                if changed {
                    self.inner.dispatcher.broadcast(StoreEvent::CharacterSelected {
                        character_id: state.selected.as_ref().map(|c| c.document_id.clone()),
                    });
                }
                Ok(true)
            }
            Err(e) => {
                error!("Failed to fetch characters: {:#}", e);
                state.status = CatalogStatus::Error;
                state.last_error = Some(format!("{:#}", e));
                Err(StoreError::Backend(e))
            }
        }
    }

    pub fn select_character(&self, character: AiCharacter) {
        let character_id = character.document_id.clone();
        self.state().selected = Some(character);
        self.inner.dispatcher.broadcast(StoreEvent::CharacterSelected {
            character_id: Some(character_id),
        });
    }

    /// Select by document id from the loaded catalog. An unknown id clears
    /// the selection and returns `None`.
    pub fn select_character_id(&self, character_id: &str) -> Option<AiCharacter> {
        let selected = {
            let mut state = self.state();
            let found = state
                .characters
                .iter()
                .find(|c| c.document_id == character_id)
                .cloned();
            state.selected = found.clone();
            found
        };
        self.inner.dispatcher.broadcast(StoreEvent::CharacterSelected {
            character_id: selected.as_ref().map(|c| c.document_id.clone()),
        });
        selected
    }

    pub fn characters(&self) -> Vec<AiCharacter> {
        self.state().characters.clone()
    }

    pub fn selected(&self) -> Option<AiCharacter> {
        self.state().selected.clone()
    }

    pub fn status(&self) -> CatalogStatus {
        self.state().status
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }
}
