//! Speech engines.

use crate::error::{DrishtiError, Result};
use crate::exec::CommandExecutor;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A blocking text-to-speech engine.
pub trait SpeechEngine: Send + Sync {
    /// Speak `text` and return once playback has finished.
    ///
    /// `language` selects a voice when the engine supports several.
    fn speak(&self, text: &str, language: Option<&str>) -> Result<()>;

    fn name(&self) -> &str;
}

fn speech_error(e: DrishtiError) -> DrishtiError {
    match e {
        DrishtiError::ToolNotFound { tool } => DrishtiError::SpeechToolNotFound { tool },
        other => DrishtiError::Synthesis {
            message: other.to_string(),
        },
    }
}

/// Synthesizer that speaks directly (`espeak-ng -s <rate> <text>`).
pub struct ResidentEngine {
    executor: Arc<dyn CommandExecutor>,
    command: String,
    rate: u32,
}

impl ResidentEngine {
    pub fn new(executor: Arc<dyn CommandExecutor>, command: &str, rate: u32) -> Self {
        Self {
            executor,
            command: command.to_string(),
            rate,
        }
    }
}

impl SpeechEngine for ResidentEngine {
    fn speak(&self, text: &str, language: Option<&str>) -> Result<()> {
        let rate = self.rate.to_string();
        let mut args = vec!["-s", rate.as_str()];
        if let Some(language) = language {
            args.extend(["-v", language]);
        }
        // Model text may begin with '-'
        args.extend(["--", text]);

        self.executor
            .execute(&self.command, &args)
            .map(|_| ())
            .map_err(speech_error)
    }

    fn name(&self) -> &str {
        &self.command
    }
}

/// Engine that renders a temporary WAV file, plays it, and deletes it.
pub struct GeneratedAudioEngine {
    executor: Arc<dyn CommandExecutor>,
    synth_command: String,
    player_command: String,
    rate: u32,
}

impl GeneratedAudioEngine {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        synth_command: &str,
        player_command: &str,
        rate: u32,
    ) -> Self {
        Self {
            executor,
            synth_command: synth_command.to_string(),
            player_command: player_command.to_string(),
            rate,
        }
    }
}

/// Reject missing, unreadable or silent WAV files before handing them to a player.
pub fn validate_wav(path: &Path) -> Result<()> {
    let reader = hound::WavReader::open(path).map_err(|e| DrishtiError::Synthesis {
        message: format!("Generated audio {} is not a WAV file: {}", path.display(), e),
    })?;
    if reader.duration() == 0 {
        return Err(DrishtiError::Synthesis {
            message: format!("Generated audio {} is empty", path.display()),
        });
    }
    Ok(())
}

impl SpeechEngine for GeneratedAudioEngine {
    fn speak(&self, text: &str, language: Option<&str>) -> Result<()> {
        // Removed when `audio` drops, including on early return
        let audio = tempfile::Builder::new()
            .prefix("drishti-voice-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| DrishtiError::Synthesis {
                message: format!("Failed to create temporary audio file: {}", e),
            })?;
        let path = audio.path().to_string_lossy().into_owned();

        let rate = self.rate.to_string();
        let mut args = vec!["-s", rate.as_str(), "-w", path.as_str()];
        if let Some(language) = language {
            args.extend(["-v", language]);
        }
        // Model text may begin with '-'
        args.extend(["--", text]);

        self.executor
            .execute(&self.synth_command, &args)
            .map_err(speech_error)?;

        validate_wav(audio.path())?;

        self.executor
            .execute(&self.player_command, &[path.as_str()])
            .map_err(speech_error)?;

        Ok(())
    }

    fn name(&self) -> &str {
        &self.synth_command
    }
}

type SpokenLog = Arc<Mutex<Vec<(String, Option<String>)>>>;

/// Engine that records what it was asked to say.
#[derive(Clone)]
pub struct RecordingEngine {
    name: String,
    log: SpokenLog,
    attempts: Arc<AtomicU32>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicU32::new(0)),
            fail: false,
            delay: None,
        }
    }

    /// Fail every utterance.
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Take this long per utterance, like real playback.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Record into `log`, so several engines share one ordered transcript.
    pub fn with_log(mut self, log: SpokenLog) -> Self {
        self.log = log;
        self
    }

    pub fn shared_log(&self) -> SpokenLog {
        Arc::clone(&self.log)
    }

    /// Successfully spoken `(text, language)` pairs.
    pub fn spoken(&self) -> Vec<(String, Option<String>)> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Texts only, in order.
    pub fn texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|(text, _)| text).collect()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for RecordingEngine {
    fn speak(&self, text: &str, language: Option<&str>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(DrishtiError::Synthesis {
                message: format!("{} refused to speak", self.name),
            });
        }
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((text.to_string(), language.map(str::to_string)));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockCommandExecutor;
    use std::path::PathBuf;

    /// Writes a WAV wherever `-w` points and records whether the file existed
    /// when the player ran.
    #[derive(Default)]
    struct FakeToolchain {
        samples: u32,
        played: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl CommandExecutor for FakeToolchain {
        fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
            match command {
                "synth" => {
                    let index = args.iter().position(|a| *a == "-w").unwrap();
                    let spec = hound::WavSpec {
                        channels: 1,
                        sample_rate: 22050,
                        bits_per_sample: 16,
                        sample_format: hound::SampleFormat::Int,
                    };
                    let mut writer = hound::WavWriter::create(args[index + 1], spec).unwrap();
                    for _ in 0..self.samples {
                        writer.write_sample(0i16).unwrap();
                    }
                    writer.finalize().unwrap();
                    Ok(String::new())
                }
                "player" => {
                    let path = PathBuf::from(args[0]);
                    let exists = path.exists();
                    self.played.lock().unwrap().push((path, exists));
                    Ok(String::new())
                }
                other => panic!("unexpected command {other}"),
            }
        }
    }

    #[test]
    fn resident_engine_passes_rate_and_text() {
        let executor = Arc::new(MockCommandExecutor::new());
        let engine = ResidentEngine::new(executor.clone(), "espeak-ng", 180);

        engine.speak("System Ready.", None).unwrap();

        assert_eq!(
            executor.call(0).unwrap(),
            (
                "espeak-ng".to_string(),
                vec![
                    "-s".to_string(),
                    "180".to_string(),
                    "--".to_string(),
                    "System Ready.".to_string()
                ]
            )
        );
    }

    #[test]
    fn leading_dash_text_is_not_an_option() {
        let executor = Arc::new(MockCommandExecutor::new());
        let engine = ResidentEngine::new(executor.clone(), "espeak-ng", 180);

        engine.speak("- a person holding a cup", Some("en")).unwrap();

        let (_, args) = executor.call(0).unwrap();
        let last = args.len() - 1;
        assert_eq!(args[last], "- a person holding a cup");
        assert_eq!(args[last - 1], "--");
    }

    #[test]
    fn generated_engine_separates_text_from_options() {
        let executor = Arc::new(MockCommandExecutor::new());
        let engine = GeneratedAudioEngine::new(executor.clone(), "espeak-ng", "paplay", 180);

        // No WAV is written by the mock, so validation fails after synthesis
        assert!(engine.speak("-- ಕೆಂಪು", Some("kn")).is_err());

        let (_, args) = executor.call(0).unwrap();
        let last = args.len() - 1;
        assert_eq!(args[last], "-- ಕೆಂಪು");
        assert_eq!(args[last - 1], "--");
    }

    #[test]
    fn resident_engine_missing_tool() {
        let executor = Arc::new(MockCommandExecutor::new().with_error(DrishtiError::ToolNotFound {
            tool: "espeak-ng".to_string(),
        }));
        let engine = ResidentEngine::new(executor, "espeak-ng", 180);
        let err = engine.speak("hi", None).unwrap_err();
        assert!(matches!(
            err,
            DrishtiError::SpeechToolNotFound { ref tool } if tool == "espeak-ng"
        ));
    }

    #[test]
    fn generated_engine_plays_then_deletes_file() {
        let tools = Arc::new(FakeToolchain {
            samples: 100,
            ..Default::default()
        });
        let engine = GeneratedAudioEngine::new(tools.clone(), "synth", "player", 150);

        engine.speak("लाल गेंद", Some("hi")).unwrap();

        let played = tools.played.lock().unwrap().clone();
        assert_eq!(played.len(), 1);
        let (path, existed_during_playback) = &played[0];
        assert!(existed_during_playback);
        assert!(!path.exists(), "temporary audio should be removed");
    }

    #[test]
    fn generated_engine_rejects_silent_audio() {
        let tools = Arc::new(FakeToolchain::default());
        let engine = GeneratedAudioEngine::new(tools.clone(), "synth", "player", 150);

        let err = engine.speak("ಕೆಂಪು", Some("kn")).unwrap_err();
        assert!(matches!(err, DrishtiError::Synthesis { .. }));
        assert!(tools.played.lock().unwrap().is_empty());
    }

    #[test]
    fn generated_engine_without_output_file_is_synthesis_error() {
        // Synth "succeeds" but writes nothing into the temp file
        let executor = Arc::new(MockCommandExecutor::new());
        let engine = GeneratedAudioEngine::new(executor.clone(), "espeak-ng", "paplay", 180);
        let err = engine.speak("नमस्ते", Some("hi")).unwrap_err();
        assert!(matches!(err, DrishtiError::Synthesis { .. }));
        assert_eq!(executor.call_count(), 1);
        let (_, args) = executor.call(0).unwrap();
        assert!(args.contains(&"-v".to_string()));
        assert!(args.contains(&"hi".to_string()));
    }

    #[test]
    fn recording_engine_counts_failed_attempts() {
        let engine = RecordingEngine::new("r").with_failure();
        assert!(engine.speak("x", None).is_err());
        assert_eq!(engine.attempts(), 1);
        assert!(engine.spoken().is_empty());
    }
}
