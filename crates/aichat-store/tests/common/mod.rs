//! Scripted collaborators for driving the stores without a server.
//!
//! Every backend reply is released through a oneshot gate so a test decides
//! exactly when (and in which order) responses land.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use aichat_store::{
    CharacterCatalog, ConversationBackend, IdentityProvider, SpeechOutput, SpeechRequest,
};
use aichat_types::api::{NewMessage, PageMeta, StrapiPage};
use aichat_types::models::{AiCharacter, ConversationRecord, Pagination, UserProfile};

pub type PageReply = anyhow::Result<StrapiPage<ConversationRecord>>;
pub type SendReply = anyhow::Result<[ConversationRecord; 2]>;

#[derive(Default)]
pub struct FakeBackend {
    pages: Mutex<HashMap<(String, u32), VecDeque<oneshot::Receiver<PageReply>>>>,
    sends: Mutex<HashMap<String, oneshot::Receiver<SendReply>>>,
    list_calls: AtomicUsize,
    send_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply slot for the next request of `page` for `character_id`.
    pub fn gate_page(&self, character_id: &str, page: u32) -> oneshot::Sender<PageReply> {
        let (tx, rx) = oneshot::channel();
        self.pages
            .lock()
            .unwrap()
            .entry((character_id.to_string(), page))
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn page_ready(&self, character_id: &str, page: u32, reply: PageReply) {
        let _ = self.gate_page(character_id, page).send(reply);
    }

    pub fn gate_send(&self, client_id: Uuid) -> oneshot::Sender<SendReply> {
        let (tx, rx) = oneshot::channel();
        self.sends.lock().unwrap().insert(client_id.to_string(), rx);
        tx
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationBackend for FakeBackend {
    async fn list_conversations(
        &self,
        character_id: &str,
        page: u32,
        _page_size: u32,
    ) -> PageReply {
        let gate = self
            .pages
            .lock()
            .unwrap()
            .get_mut(&(character_id.to_string(), page))
            .and_then(VecDeque::pop_front);
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match gate {
            Some(rx) => rx.await.unwrap_or_else(|_| Err(anyhow!("gate dropped"))),
            None => Err(anyhow!("no reply scripted for {} page {}", character_id, page)),
        }
    }

    async fn create_message(&self, _character_id: &str, message: NewMessage) -> SendReply {
        let gate = self.sends.lock().unwrap().remove(&message.message_id);
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        match gate {
            Some(rx) => rx.await.unwrap_or_else(|_| Err(anyhow!("gate dropped"))),
            None => Err(anyhow!("no reply scripted for {}", message.message_id)),
        }
    }
}

pub struct FakeCatalog {
    replies: Mutex<VecDeque<anyhow::Result<Vec<AiCharacter>>>>,
}

impl FakeCatalog {
    pub fn new(replies: Vec<anyhow::Result<Vec<AiCharacter>>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl CharacterCatalog for FakeCatalog {
    async fn list_characters(&self) -> anyhow::Result<Vec<AiCharacter>> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no catalog reply scripted")))
    }
}

pub struct StaticIdentity(pub Option<UserProfile>);

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserProfile> {
        self.0.clone()
    }
}

pub fn signed_in() -> Arc<StaticIdentity> {
    Arc::new(StaticIdentity(Some(user())))
}

#[derive(Default)]
pub struct RecordingSpeech {
    pub spoken: Mutex<Vec<SpeechRequest>>,
}

impl SpeechOutput for RecordingSpeech {
    fn speak(&self, request: SpeechRequest) {
        self.spoken.lock().unwrap().push(request);
    }
}

/// Let spawned store futures run until `done` holds.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Fixed instant `secs` seconds into the test history.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
}

pub fn user() -> UserProfile {
    UserProfile {
        id: 7,
        document_id: "user-7".into(),
        username: "mia".into(),
        email: "mia@example.com".into(),
        provider: "local".into(),
        confirmed: true,
        blocked: false,
        user_icon_url: None,
        created_at: at(0),
        updated_at: at(0),
        published_at: None,
    }
}

pub fn character(document_id: &str, name: &str) -> AiCharacter {
    AiCharacter {
        id: 1,
        document_id: document_id.into(),
        name: name.into(),
        introduce: format!("I am {}", name),
        cover_url: None,
        agent_id: None,
        created_at: at(0),
        updated_at: at(0),
        published_at: None,
    }
}

pub fn query(document_id: &str, text: &str, secs: i64) -> ConversationRecord {
    ConversationRecord {
        id: 0,
        document_id: document_id.into(),
        query: text.into(),
        answer: None,
        message_id: None,
        conversation_id: None,
        user: Some(user()),
        ai_character: None,
        created_at: Some(at(secs)),
        updated_at: at(secs),
        message_status: None,
    }
}

pub fn answer(document_id: &str, text: &str, secs: i64) -> ConversationRecord {
    ConversationRecord {
        answer: Some(text.into()),
        user: None,
        ..query(document_id, "", secs)
    }
}

pub fn page(
    data: Vec<ConversationRecord>,
    page: u32,
    page_count: u32,
    total: u32,
) -> StrapiPage<ConversationRecord> {
    StrapiPage {
        data,
        meta: PageMeta {
            pagination: Pagination {
                page,
                page_size: 2,
                page_count,
                total,
            },
        },
    }
}
