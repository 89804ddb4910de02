//! Database row types. These map directly to SQLite rows; conversion to the
//! shared models happens in `queries`.

use aichat_types::models::UserProfile;

pub struct SessionRow {
    pub jwt: String,
    pub user_json: String,
    pub saved_at: String,
}

pub struct SettingsRow {
    pub language: String,
    pub speed: f64,
    pub auto_speech: bool,
    pub speech_engine: String,
}

/// A previously signed-in session, restored on startup.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub jwt: String,
    pub user: UserProfile,
}
