use aichat_types::settings::SpeechEngine;

/// Plain-text utterance handed to a synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub language: String,
    pub speed: f32,
    pub engine: SpeechEngine,
}

/// Reads answers aloud.
///
/// `speak` is fire-and-forget: implementations must return immediately
/// (spawning their own work) and swallow their own failures.
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, request: SpeechRequest);
}
