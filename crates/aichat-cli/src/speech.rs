use tracing::info;

use aichat_store::{SpeechOutput, SpeechRequest};

/// Terminal stand-in for a synthesizer: the utterance goes to the log.
pub struct LogSpeech;

impl SpeechOutput for LogSpeech {
    fn speak(&self, request: SpeechRequest) {
        info!(
            language = %request.language,
            speed = request.speed,
            engine = %request.engine,
            "Speaking: {}",
            request.text
        );
    }
}
