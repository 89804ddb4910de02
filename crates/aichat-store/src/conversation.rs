//! History of the active character conversation.
//!
//! The store is the single writer of the message list and the page cursor.
//! Backend calls are made without holding the state lock; every response is
//! checked against the session (and, for first-page loads, the request
//! sequence) it was issued under before it is applied, so a late response
//! for a conversation the user already left is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use aichat_types::api::{NewMessage, StrapiPage};
use aichat_types::chat::{ChatMessage, MessageId};
use aichat_types::events::StoreEvent;
use aichat_types::models::{AiCharacter, ConversationRecord, Pagination, UserProfile};

use crate::backend::{ConversationBackend, IdentityProvider};
use crate::dispatcher::Dispatcher;
use crate::error::StoreError;
use crate::markdown;
use crate::ordering;
use crate::settings::SettingsStore;
use crate::speech::{SpeechOutput, SpeechRequest};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// How long the "new message" highlight stays up after a confirmed send.
const NEW_MESSAGE_FLAG_TTL: Duration = Duration::from_millis(1500);

/// Settled sends remembered per conversation; pending sends are never evicted.
const MAX_SETTLED_SENDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Lifecycle of one optimistic send, keyed by its client id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendState {
    Pending,
    Confirmed { server_ids: Vec<MessageId> },
    Failed { reason: String },
}

/// Read-only copy of the conversation state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationSnapshot {
    pub character_id: Option<String>,
    pub session: u64,
    pub messages: Vec<ChatMessage>,
    pub pagination: Option<Pagination>,
    pub load_status: LoadStatus,
    pub more_status: LoadStatus,
    pub has_more: bool,
    pub has_new_message: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { count: usize },
    /// The conversation changed or a newer first-page load was issued.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMoreOutcome {
    Appended { added: usize },
    /// Not active, nothing more to load, or a load is already in flight.
    Skipped,
    Discarded,
}

/// The authoritative pair that replaced a send's provisional entries.
#[derive(Debug, Clone, PartialEq)]
pub struct SentExchange {
    pub client_id: Uuid,
    pub query: ChatMessage,
    pub answer: ChatMessage,
}

struct SendEntry {
    state: SendState,
    /// First-page load sequence current when the send settled.
    settled_seq: u64,
}

#[derive(Default)]
struct ConversationState {
    character_id: Option<String>,
    character: Option<AiCharacter>,
    session: u64,
    initial_seq: u64,
    next_token: u64,
    messages: Vec<ChatMessage>,
    pagination: Option<Pagination>,
    load_status: LoadStatus,
    more_status: LoadStatus,
    more_in_flight: Option<u64>,
    sends: HashMap<Uuid, SendEntry>,
    settled: VecDeque<Uuid>,
    new_message_seq: u64,
    has_new_message: bool,
}

impl ConversationState {
    fn is_current(&self, session: u64) -> bool {
        self.session == session
    }

    fn is_active(&self, character_id: &str) -> bool {
        self.character_id.as_deref() == Some(character_id)
    }

    fn is_pending(&self, client_id: Uuid) -> bool {
        self.sends
            .get(&client_id)
            .is_some_and(|e| e.state == SendState::Pending)
    }

    fn begin_send(&mut self, client_id: Uuid) {
        self.sends.insert(
            client_id,
            SendEntry {
                state: SendState::Pending,
                settled_seq: 0,
            },
        );
    }

    /// Record the outcome of a send, forgetting the oldest settled sends
    /// past `MAX_SETTLED_SENDS`.
    fn settle(&mut self, client_id: Uuid, outcome: SendState) {
        self.sends.insert(
            client_id,
            SendEntry {
                state: outcome,
                settled_seq: self.initial_seq,
            },
        );
        self.settled.retain(|id| *id != client_id);
        self.settled.push_back(client_id);
        while self.settled.len() > MAX_SETTLED_SENDS {
            if let Some(evicted) = self.settled.pop_front() {
                self.sends.remove(&evicted);
            }
        }
    }

    /// Entries a first-page load issued as `seq` must not drop: sends still
    /// in flight, and pairs confirmed after that page was requested.
    fn carried_over(&self, seq: u64) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| match m.id.client_id() {
                Some(client_id) => self.is_pending(client_id),
                None => self.sends.values().any(|e| {
                    e.settled_seq >= seq
                        && matches!(&e.state, SendState::Confirmed { server_ids } if server_ids.contains(&m.id))
                }),
            })
            .cloned()
            .collect()
    }

    fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            character_id: self.character_id.clone(),
            session: self.session,
            messages: self.messages.clone(),
            pagination: self.pagination,
            load_status: self.load_status,
            more_status: self.more_status,
            has_more: self.pagination.is_some_and(|p| p.has_more()),
            has_new_message: self.has_new_message,
        }
    }
}

#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    backend: Arc<dyn ConversationBackend>,
    identity: Arc<dyn IdentityProvider>,
    dispatcher: Dispatcher,
    page_size: u32,
    settings: Option<SettingsStore>,
    speech: Option<Arc<dyn SpeechOutput>>,
    state: Mutex<ConversationState>,
}

impl StoreInner {
    fn state(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConversationStore {
    pub fn new(
        backend: Arc<dyn ConversationBackend>,
        identity: Arc<dyn IdentityProvider>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self::builder(backend, identity, dispatcher).build()
    }

    pub fn builder(
        backend: Arc<dyn ConversationBackend>,
        identity: Arc<dyn IdentityProvider>,
        dispatcher: Dispatcher,
    ) -> ConversationStoreBuilder {
        ConversationStoreBuilder {
            backend,
            identity,
            dispatcher,
            page_size: DEFAULT_PAGE_SIZE,
            settings: None,
            speech: None,
        }
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.inner.state().snapshot()
    }

    pub fn send_state(&self, client_id: Uuid) -> Option<SendState> {
        self.inner
            .state()
            .sends
            .get(&client_id)
            .map(|e| e.state.clone())
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StoreEvent> {
        self.inner.dispatcher.subscribe()
    }

    /// Make `character` the active conversation, keeping it for attributing
    /// replies. Switching characters clears the previous conversation.
    pub fn set_character(&self, character: AiCharacter) {
        let mut state = self.inner.state();
        self.activate(&mut state, &character.document_id);
        state.character = Some(character);
    }

    /// Tear down the active conversation, e.g. on sign-out.
    pub fn clear(&self) {
        let mut state = self.inner.state();
        let session = state.session + 1;
        *state = ConversationState {
            session,
            initial_seq: state.initial_seq,
            next_token: state.next_token,
            new_message_seq: state.new_message_seq,
            ..Default::default()
        };
        debug!(session, "Conversation cleared");
    }

    pub fn reset_new_message_flag(&self) {
        let mut state = self.inner.state();
        self.lower_new_message_flag(&mut state);
    }

    /// Replace the conversation with the newest page.
    ///
    /// On failure the existing messages and cursor are kept and only the
    /// load status turns to `Error`.
    pub async fn load_initial(&self, character_id: &str) -> Result<LoadOutcome, StoreError> {
        if character_id.is_empty() {
            return Err(StoreError::EmptyCharacterId);
        }

        let (session, seq) = {
            let mut state = self.inner.state();
            self.activate(&mut state, character_id);
            state.initial_seq += 1;
            state.load_status = LoadStatus::Loading;
            (state.session, state.initial_seq)
        };
        let _loading = InitialLoadGuard {
            inner: &self.inner,
            seq,
        };

        let result = self
            .inner
            .backend
            .list_conversations(character_id, 1, self.inner.page_size)
            .await;
        let user = self.inner.identity.current_user();

        let mut state = self.inner.state();
        if !state.is_current(session) || state.initial_seq != seq {
            debug!(character_id, session, seq, "Discarding superseded history page");
            return Ok(LoadOutcome::Discarded);
        }

        match result {
            Ok(page) => {
                let pagination = page.pagination();
                let fetched = to_messages(page, user.as_ref(), state.character.as_ref());

                let mut messages = state.carried_over(seq);
                let count = ordering::merge(&mut messages, fetched);
                debug_assert!(ordering::is_newest_first(&messages));

                state.messages = messages;
                state.pagination = Some(pagination);
                state.load_status = LoadStatus::Success;
                info!(
                    character_id,
                    count,
                    page = pagination.page,
                    page_count = pagination.page_count,
                    "Loaded conversation history"
                );
                self.inner.dispatcher.broadcast(StoreEvent::HistoryLoaded {
                    character_id: character_id.to_string(),
                    count,
                    pagination,
                });
                Ok(LoadOutcome::Applied { count })
            }
            Err(e) => {
                error!(character_id, "Failed to fetch conversation history: {:#}", e);
                state.load_status = LoadStatus::Error;
                self.inner.dispatcher.broadcast(StoreEvent::HistoryLoadFailed {
                    character_id: character_id.to_string(),
                    message: format!("{:#}", e),
                });
                Err(StoreError::Backend(e))
            }
        }
    }

    /// Fetch the next older page and add it to the tail.
    ///
    /// A no-op unless `character_id` is active, a cursor reports more pages,
    /// no first-page load is running and no other load-more is running.
    pub async fn load_more(&self, character_id: &str) -> Result<LoadMoreOutcome, StoreError> {
        let (token, session, seq, next_page) = {
            let mut state = self.inner.state();
            if !state.is_active(character_id)
                || state.more_in_flight.is_some()
                || state.load_status == LoadStatus::Loading
            {
                return Ok(LoadMoreOutcome::Skipped);
            }
            let Some(cursor) = state.pagination.filter(|p| p.has_more()) else {
                return Ok(LoadMoreOutcome::Skipped);
            };
            state.next_token += 1;
            let token = state.next_token;
            state.more_in_flight = Some(token);
            state.more_status = LoadStatus::Loading;
            self.lower_new_message_flag(&mut state);
            (token, state.session, state.initial_seq, cursor.next_page())
        };
        let _in_flight = InFlightGuard {
            inner: &self.inner,
            token,
        };

        let result = self
            .inner
            .backend
            .list_conversations(character_id, next_page, self.inner.page_size)
            .await;
        let user = self.inner.identity.current_user();

        let mut state = self.inner.state();
        if !state.is_current(session)
            || state.initial_seq != seq
            || state.more_in_flight != Some(token)
        {
            debug!(character_id, next_page, "Discarding superseded older page");
            return Ok(LoadMoreOutcome::Discarded);
        }
        state.more_in_flight = None;

        match result {
            Ok(page) => {
                let mut pagination = page.pagination();
                if let Some(current) = state.pagination {
                    if pagination.page < current.page {
                        warn!(
                            character_id,
                            returned = pagination.page,
                            current = current.page,
                            "Backend returned an earlier page than the cursor"
                        );
                        pagination.page = current.page;
                    }
                }
                let fetched = to_messages(page, user.as_ref(), state.character.as_ref());
                let added = ordering::merge(&mut state.messages, fetched);
                debug_assert!(ordering::is_newest_first(&state.messages));

                state.pagination = Some(pagination);
                state.more_status = LoadStatus::Success;
                debug!(character_id, added, page = pagination.page, "Appended older messages");
                self.inner.dispatcher.broadcast(StoreEvent::MoreHistoryLoaded {
                    character_id: character_id.to_string(),
                    added,
                    pagination,
                });
                Ok(LoadMoreOutcome::Appended { added })
            }
            Err(e) => {
                error!(character_id, next_page, "Failed to fetch older history: {:#}", e);
                state.more_status = LoadStatus::Error;
                self.inner.dispatcher.broadcast(StoreEvent::MoreHistoryLoadFailed {
                    character_id: character_id.to_string(),
                    message: format!("{:#}", e),
                });
                Err(StoreError::Backend(e))
            }
        }
    }

    /// Send `text` to the active character with an optimistic two-phase write.
    ///
    /// The user's message and a "Thinking…" reply slot appear at the head
    /// immediately. On success both are replaced by the backend's records;
    /// on failure both are removed and the error is returned.
    pub async fn send_message(
        &self,
        character_id: &str,
        text: &str,
        client_id: Uuid,
    ) -> Result<SentExchange, StoreError> {
        if character_id.is_empty() {
            return Err(StoreError::EmptyCharacterId);
        }
        if text.trim().is_empty() {
            return Err(StoreError::EmptyMessage);
        }
        let user = self
            .inner
            .identity
            .current_user()
            .ok_or(StoreError::NotSignedIn)?;

        let (session, character) = {
            let mut state = self.inner.state();
            if !state.is_active(character_id) {
                return Err(StoreError::NotActive(character_id.to_string()));
            }
            if state.sends.contains_key(&client_id) {
                return Err(StoreError::DuplicateClientId(client_id));
            }

            // Never stamp earlier than the current head, whatever the clock says.
            let now = state
                .messages
                .first()
                .map_or_else(Utc::now, |head| head.created_at.max(Utc::now()));
            let placeholder = ChatMessage::placeholder(client_id, state.character.as_ref(), now);
            let provisional = ChatMessage::provisional(client_id, text, &user, now);
            state.messages.insert(0, provisional);
            state.messages.insert(0, placeholder);
            state.begin_send(client_id);

            self.inner.dispatcher.broadcast(StoreEvent::MessagePending {
                character_id: character_id.to_string(),
                client_id,
            });
            (state.session, state.character.clone())
        };
        let mut pending = PendingSendGuard {
            inner: &self.inner,
            session,
            client_id,
            armed: true,
        };

        let result = self
            .inner
            .backend
            .create_message(
                character_id,
                NewMessage {
                    query: text.to_string(),
                    message_id: client_id.to_string(),
                },
            )
            .await
            .map_err(StoreError::Backend)
            .and_then(|records| to_exchange(client_id, records, &user, character.as_ref()));
        pending.armed = false;

        let mut state = self.inner.state();
        let current = state.is_current(session);
        if current {
            ordering::remove_send(&mut state.messages, client_id);
        }

        match result {
            Ok(exchange) => {
                if !current {
                    debug!(character_id, %client_id, "Reply arrived after conversation switch");
                    return Ok(exchange);
                }
                ordering::insert_sorted(&mut state.messages, exchange.answer.clone());
                ordering::insert_sorted(&mut state.messages, exchange.query.clone());
                debug_assert!(ordering::is_newest_first(&state.messages));

                state.settle(
                    client_id,
                    SendState::Confirmed {
                        server_ids: vec![exchange.query.id.clone(), exchange.answer.id.clone()],
                    },
                );
                if state.load_status != LoadStatus::Loading {
                    state.load_status = LoadStatus::Success;
                }
                self.raise_new_message_flag(&mut state);
                self.inner.dispatcher.broadcast(StoreEvent::MessageConfirmed {
                    character_id: character_id.to_string(),
                    client_id,
                });
                drop(state);

                self.speak(&exchange.answer);
                Ok(exchange)
            }
            Err(e) => {
                if current {
                    warn!(character_id, %client_id, "Send failed, rolled back: {}", e);
                    state.settle(
                        client_id,
                        SendState::Failed {
                            reason: e.to_string(),
                        },
                    );
                    self.inner.dispatcher.broadcast(StoreEvent::MessageRolledBack {
                        character_id: character_id.to_string(),
                        client_id,
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Switch to `character_id` if it is not already active.
    fn activate(&self, state: &mut ConversationState, character_id: &str) {
        if state.is_active(character_id) {
            return;
        }
        let session = state.session + 1;
        *state = ConversationState {
            character_id: Some(character_id.to_string()),
            session,
            initial_seq: state.initial_seq,
            next_token: state.next_token,
            new_message_seq: state.new_message_seq,
            ..Default::default()
        };
        debug!(character_id, session, "Switched conversation");
        self.inner.dispatcher.broadcast(StoreEvent::ConversationSwitched {
            character_id: character_id.to_string(),
            session,
        });
    }

    fn raise_new_message_flag(&self, state: &mut ConversationState) {
        state.has_new_message = true;
        state.new_message_seq += 1;
        let seq = state.new_message_seq;
        let store = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(NEW_MESSAGE_FLAG_TTL).await;
            let mut state = store.inner.state();
            if state.new_message_seq == seq {
                store.lower_new_message_flag(&mut state);
            }
        });
    }

    fn lower_new_message_flag(&self, state: &mut ConversationState) {
        if !state.has_new_message {
            return;
        }
        state.has_new_message = false;
        if let Some(character_id) = state.character_id.clone() {
            self.inner
                .dispatcher
                .broadcast(StoreEvent::NewMessageFlagCleared { character_id });
        }
    }

    fn speak(&self, answer: &ChatMessage) {
        let (Some(settings), Some(speech)) = (&self.inner.settings, &self.inner.speech) else {
            return;
        };
        let settings = settings.current();
        if !settings.auto_speech {
            return;
        }
        let text = markdown::plain_text(&answer.text);
        if text.is_empty() {
            return;
        }
        speech.speak(SpeechRequest {
            text,
            language: settings.language,
            speed: settings.speed,
            engine: settings.speech_engine,
        });
    }
}

pub struct ConversationStoreBuilder {
    backend: Arc<dyn ConversationBackend>,
    identity: Arc<dyn IdentityProvider>,
    dispatcher: Dispatcher,
    page_size: u32,
    settings: Option<SettingsStore>,
    speech: Option<Arc<dyn SpeechOutput>>,
}

impl ConversationStoreBuilder {
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Read answers aloud through `speech` whenever `settings` has auto-speak on.
    pub fn auto_speak(mut self, settings: SettingsStore, speech: Arc<dyn SpeechOutput>) -> Self {
        self.settings = Some(settings);
        self.speech = Some(speech);
        self
    }

    pub fn build(self) -> ConversationStore {
        ConversationStore {
            inner: Arc::new(StoreInner {
                backend: self.backend,
                identity: self.identity,
                dispatcher: self.dispatcher,
                page_size: self.page_size,
                settings: self.settings,
                speech: self.speech,
                state: Mutex::new(ConversationState::default()),
            }),
        }
    }
}

/// Clears the load-more flag when the request ends, including when the
/// caller drops the future mid-flight.
struct InFlightGuard<'a> {
    inner: &'a StoreInner,
    token: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state();
        if state.more_in_flight == Some(self.token) {
            state.more_in_flight = None;
            if state.more_status == LoadStatus::Loading {
                state.more_status = LoadStatus::Idle;
            }
        }
    }
}

/// Drops the loading status of a first-page load whose future was dropped.
struct InitialLoadGuard<'a> {
    inner: &'a StoreInner,
    seq: u64,
}

impl Drop for InitialLoadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state();
        if state.initial_seq == self.seq && state.load_status == LoadStatus::Loading {
            state.load_status = LoadStatus::Idle;
        }
    }
}

/// Rolls back a send whose future was dropped before the backend answered.
struct PendingSendGuard<'a> {
    inner: &'a StoreInner,
    session: u64,
    client_id: Uuid,
    armed: bool,
}

impl Drop for PendingSendGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state();
        if state.is_current(self.session) {
            ordering::remove_send(&mut state.messages, self.client_id);
            state.settle(
                self.client_id,
                SendState::Failed {
                    reason: "cancelled".to_string(),
                },
            );
        }
    }
}

fn to_messages(
    page: StrapiPage<ConversationRecord>,
    user: Option<&UserProfile>,
    character: Option<&AiCharacter>,
) -> Vec<ChatMessage> {
    page.data
        .into_iter()
        .filter_map(|record| {
            let id = record.document_id.clone();
            let message = record.into_chat_message(user, character);
            if message.is_none() {
                warn!(record = %id, "Dropping record with no attributable user");
            }
            message
        })
        .collect()
}

fn to_exchange(
    client_id: Uuid,
    [query, answer]: [ConversationRecord; 2],
    user: &UserProfile,
    character: Option<&AiCharacter>,
) -> Result<SentExchange, StoreError> {
    if !answer.is_answer() {
        return Err(StoreError::MalformedReply(format!(
            "record {} carries no answer",
            answer.document_id
        )));
    }
    // The first record is always the user's half, whatever it carries.
    let query = query.into_user_message(Some(user)).ok_or_else(|| {
        StoreError::MalformedReply("query record is unattributed".into())
    })?;
    let answer = answer
        .into_chat_message(Some(user), character)
        .ok_or_else(|| StoreError::MalformedReply("answer record is unattributed".into()))?;
    Ok(SentExchange {
        client_id,
        query,
        answer,
    })
}
