use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use aichat_types::events::StoreEvent;
use aichat_types::settings::{ConversationSettings, SpeechEngine, clamp_speed};

use crate::dispatcher::Dispatcher;

/// Durable home for conversation settings.
pub trait SettingsPersistence: Send + Sync {
    fn save(&self, settings: &ConversationSettings) -> anyhow::Result<()>;
}

/// Per-device conversation preferences (language, speech rate, auto-speak).
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<SettingsInner>,
}

struct SettingsInner {
    settings: RwLock<ConversationSettings>,
    persistence: Option<Arc<dyn SettingsPersistence>>,
    dispatcher: Dispatcher,
}

impl SettingsStore {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::with_initial(dispatcher, ConversationSettings::default(), None)
    }

    pub fn with_initial(
        dispatcher: Dispatcher,
        initial: ConversationSettings,
        persistence: Option<Arc<dyn SettingsPersistence>>,
    ) -> Self {
        let initial = ConversationSettings {
            speed: clamp_speed(initial.speed),
            ..initial
        };
        Self {
            inner: Arc::new(SettingsInner {
                settings: RwLock::new(initial),
                persistence,
                dispatcher,
            }),
        }
    }

    pub fn current(&self) -> ConversationSettings {
        self.inner
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_language(&self, language: impl Into<String>) {
        let language = language.into();
        self.update(|s| s.language = language);
    }

    pub fn set_speed(&self, speed: f32) {
        self.update(|s| s.speed = clamp_speed(speed));
    }

    pub fn set_auto_speech(&self, auto_speech: bool) {
        self.update(|s| s.auto_speech = auto_speech);
    }

    pub fn set_speech_engine(&self, engine: SpeechEngine) {
        self.update(|s| s.speech_engine = engine);
    }

    /// Apply `f`, persist, and notify. A persistence failure is logged; the
    /// in-memory change stands.
    pub fn update(&self, f: impl FnOnce(&mut ConversationSettings)) -> ConversationSettings {
        let updated = {
            let mut settings = self
                .inner
                .settings
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let before = settings.clone();
            f(&mut settings);
            settings.speed = clamp_speed(settings.speed);
            if *settings == before {
                return before;
            }
            settings.clone()
        };

        debug!(?updated, "Conversation settings changed");
        if let Some(persistence) = &self.inner.persistence {
            if let Err(e) = persistence.save(&updated) {
                warn!("Failed to persist conversation settings: {:#}", e);
            }
        }
        self.inner.dispatcher.broadcast(StoreEvent::SettingsChanged);
        updated
    }
}
