//! Speech output.
//!
//! Two engines: a resident synthesizer that speaks directly and blocks until
//! done, and a generated-audio engine that renders a temporary WAV file and
//! plays it. Script detection picks the engine per utterance. Playback is
//! strictly sequential and failures never reach the caller.

pub mod engine;

pub use engine::{GeneratedAudioEngine, RecordingEngine, ResidentEngine, SpeechEngine};

use crate::config::SpeechConfig;
use crate::exec::CommandExecutor;
use crate::router::{Script, Utterance, detect_script};
use std::sync::Arc;

/// Routes utterances to the right engine and speaks them in order.
#[derive(Clone)]
pub struct Synthesizer {
    resident: Arc<dyn SpeechEngine>,
    generated: Arc<dyn SpeechEngine>,
}

impl Synthesizer {
    pub fn new(resident: Arc<dyn SpeechEngine>, generated: Arc<dyn SpeechEngine>) -> Self {
        Self {
            resident,
            generated,
        }
    }

    /// Build both engines from configuration.
    pub fn from_config(config: &SpeechConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self::new(
            Arc::new(ResidentEngine::new(
                Arc::clone(&executor),
                &config.resident_command,
                config.rate,
            )),
            Arc::new(GeneratedAudioEngine::new(
                executor,
                &config.generate_command,
                &config.player_command,
                config.rate,
            )),
        )
    }

    /// Speak one text and wait for playback to finish.
    ///
    /// Devanagari and Kannada text goes to the generated-audio engine with the
    /// matching voice; everything else to the resident engine. Errors are
    /// logged and dropped.
    pub fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let script = detect_script(text);
        let result = match script.voice_language() {
            Some(language) => self.generated.speak(text, Some(language)),
            None => self.resident.speak(text, None),
        };

        if let Err(e) = result {
            let engine = match script {
                Script::Default => self.resident.name(),
                _ => self.generated.name(),
            };
            tracing::warn!(engine, "Speech failed, skipping utterance: {}", e);
        }
    }

    /// Speak utterances one after another, in order.
    pub fn speak_sequence(&self, utterances: &[Utterance]) {
        for utterance in utterances {
            self.speak(&utterance.text);
        }
    }

    /// Run [`speak_sequence`](Self::speak_sequence) on a blocking thread and
    /// wait for it.
    pub async fn say(&self, utterances: Vec<Utterance>) {
        let synthesizer = self.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || synthesizer.speak_sequence(&utterances)).await
        {
            tracing::warn!("Speech task failed: {}", e);
        }
    }
}
