use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Which synthesizer reads answers aloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngine {
    ElevenLabs,
    System,
}

impl fmt::Display for SpeechEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElevenLabs => f.write_str("elevenlabs"),
            Self::System => f.write_str("system"),
        }
    }
}

impl FromStr for SpeechEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "elevenlabs" => Ok(Self::ElevenLabs),
            "system" => Ok(Self::System),
            other => Err(format!("unknown speech engine '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSettings {
    pub language: String,
    pub speed: f32,
    pub auto_speech: bool,
    pub speech_engine: SpeechEngine,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            speed: 1.0,
            auto_speech: true,
            speech_engine: SpeechEngine::ElevenLabs,
        }
    }
}

pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}
