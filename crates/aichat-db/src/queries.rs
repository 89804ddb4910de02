use crate::Database;
use crate::models::{SessionRow, SettingsRow, StoredSession};
use aichat_types::models::UserProfile;
use aichat_types::settings::{ConversationSettings, SpeechEngine, clamp_speed};
use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, warn};

impl Database {
    // -- Session --

    pub fn save_session(&self, jwt: &str, user: &UserProfile) -> Result<()> {
        let user_json = serde_json::to_string(user)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session (id, jwt, user_json) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                    jwt = excluded.jwt,
                    user_json = excluded.user_json,
                    saved_at = datetime('now')",
                (jwt, &user_json),
            )?;
            Ok(())
        })?;
        debug!(user = %user.username, "Session saved");
        Ok(())
    }

    /// The stored session, if any. A row whose profile no longer parses is
    /// treated as signed out.
    pub fn load_session(&self) -> Result<Option<StoredSession>> {
        let Some(row) = self.with_conn(query_session)? else {
            return Ok(None);
        };
        match serde_json::from_str::<UserProfile>(&row.user_json) {
            Ok(user) => Ok(Some(StoredSession { jwt: row.jwt, user })),
            Err(e) => {
                warn!(saved_at = %row.saved_at, "Discarding unreadable stored session: {}", e);
                Ok(None)
            }
        }
    }

    pub fn clear_session(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM session", [])?;
            Ok(())
        })
    }

    // -- Settings --

    pub fn save_settings(&self, settings: &ConversationSettings) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (id, language, speed, auto_speech, speech_engine)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    language = excluded.language,
                    speed = excluded.speed,
                    auto_speech = excluded.auto_speech,
                    speech_engine = excluded.speech_engine,
                    updated_at = datetime('now')",
                rusqlite::params![
                    settings.language,
                    f64::from(settings.speed),
                    settings.auto_speech,
                    settings.speech_engine.to_string(),
                ],
            )
            .context("writing settings")?;
            Ok(())
        })
    }

    /// Stored settings, or `None` on first launch.
    pub fn load_settings(&self) -> Result<Option<ConversationSettings>> {
        let Some(row) = self.with_conn(query_settings)? else {
            return Ok(None);
        };
        let speech_engine = row.speech_engine.parse::<SpeechEngine>().unwrap_or_else(|e| {
            warn!("{}; falling back to the default engine", e);
            ConversationSettings::default().speech_engine
        });
        Ok(Some(ConversationSettings {
            language: row.language,
            speed: clamp_speed(row.speed as f32),
            auto_speech: row.auto_speech,
            speech_engine,
        }))
    }
}

fn query_session(conn: &Connection) -> Result<Option<SessionRow>> {
    let mut stmt = conn.prepare("SELECT jwt, user_json, saved_at FROM session WHERE id = 1")?;

    let row = stmt
        .query_row([], |row| {
            Ok(SessionRow {
                jwt: row.get(0)?,
                user_json: row.get(1)?,
                saved_at: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_settings(conn: &Connection) -> Result<Option<SettingsRow>> {
    let mut stmt = conn.prepare(
        "SELECT language, speed, auto_speech, speech_engine FROM settings WHERE id = 1",
    )?;

    let row = stmt
        .query_row([], |row| {
            Ok(SettingsRow {
                language: row.get(0)?,
                speed: row.get(1)?,
                auto_speech: row.get(2)?,
                speech_engine: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
