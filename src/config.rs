use crate::defaults;
use crate::error::{DrishtiError, Result};
use crate::ipc::framing::Framing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub backend: BackendConfig,
    pub output: OutputConfig,
    pub speech: SpeechConfig,
    pub ocr: OcrConfig,
    pub evidence: EvidenceConfig,
    pub control: ControlConfig,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub warmup_frames: u32,
    /// Queued frames dropped before every capture.
    pub stale_frames: u32,
    pub read_attempts: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Serve this still image instead of opening a camera.
    pub still_image: Option<PathBuf>,
}

/// Which inference backend answers questions about frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Long-lived inference server over a Unix socket
    Remote,
    /// HTTP completion endpoint (llama.cpp server)
    Completion,
    /// In-process Moondream model
    Moondream,
    /// Canned answers, for demos and tests
    Mock,
}

/// Inference backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub socket: PathBuf,
    pub framing: Framing,
    pub model_path: String,
    pub n_predict: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Where the frame is written for the server to read.
    pub scratch_image: PathBuf,
    pub completion_url: String,
}

/// Output routing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Languages spoken after English by the describe-once mode.
    pub languages: Vec<String>,
    pub translate: bool,
    pub translate_url: String,
}

/// Speech configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    /// Resident engine binary (blocks until the utterance is spoken).
    pub resident_command: String,
    /// Synthesizer that writes a WAV file for non-Latin scripts.
    pub generate_command: String,
    /// Player for generated WAV files.
    pub player_command: String,
    pub rate: u32,
    /// Speak "System Ready." and "Scanning." cues.
    pub announce: bool,
}

/// OCR configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    pub command: String,
    pub languages: String,
}

/// Evidence logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvidenceConfig {
    pub enabled: bool,
    pub image_dir: PathBuf,
    pub session_log: PathBuf,
    pub daily_log_dir: PathBuf,
}

/// Control socket configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ControlConfig {
    /// Socket accepting trigger messages; `None` uses the runtime default.
    pub socket: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: defaults::CAMERA_INDEX,
            warmup_frames: defaults::WARMUP_FRAMES,
            stale_frames: defaults::STALE_FRAMES,
            read_attempts: defaults::CAMERA_READ_ATTEMPTS,
            width: None,
            height: None,
            still_image: None,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Remote,
            socket: PathBuf::from(defaults::INFERENCE_SOCKET),
            framing: Framing::default(),
            model_path: defaults::MODEL_PATH.to_string(),
            n_predict: defaults::N_PREDICT,
            temperature: defaults::TEMPERATURE,
            timeout_secs: defaults::INFERENCE_TIMEOUT_SECS,
            scratch_image: std::env::temp_dir().join("drishti-frame.png"),
            completion_url: defaults::COMPLETION_URL.to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            languages: defaults::DESCRIBE_LANGUAGES
                .iter()
                .map(|l| l.to_string())
                .collect(),
            translate: true,
            translate_url: defaults::TRANSLATE_URL.to_string(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            resident_command: "espeak-ng".to_string(),
            generate_command: "espeak-ng".to_string(),
            player_command: "paplay".to_string(),
            rate: defaults::SPEECH_RATE,
            announce: true,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "tesseract".to_string(),
            languages: "eng+hin".to_string(),
        }
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image_dir: PathBuf::from("captured_evidence"),
            session_log: PathBuf::from("session_log.txt"),
            daily_log_dir: PathBuf::from("history_logs"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e.context(format!("Failed to load config from {}", path.display())))
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - DRISHTI_SOCKET → backend.socket
    /// - DRISHTI_BACKEND → backend.kind (remote, completion, moondream)
    /// - DRISHTI_CAMERA → camera.index
    /// - DRISHTI_TRANSLATE_URL → output.translate_url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(socket) = std::env::var("DRISHTI_SOCKET")
            && !socket.is_empty()
        {
            self.backend.socket = PathBuf::from(socket);
        }

        if let Ok(kind) = std::env::var("DRISHTI_BACKEND") {
            match kind.as_str() {
                "remote" => self.backend.kind = BackendKind::Remote,
                "completion" => self.backend.kind = BackendKind::Completion,
                "moondream" => self.backend.kind = BackendKind::Moondream,
                "mock" => self.backend.kind = BackendKind::Mock,
                "" => {}
                other => tracing::warn!("Ignoring unknown DRISHTI_BACKEND '{}'", other),
            }
        }

        if let Ok(camera) = std::env::var("DRISHTI_CAMERA")
            && let Ok(index) = camera.parse::<u32>()
        {
            self.camera.index = index;
        }

        if let Ok(url) = std::env::var("DRISHTI_TRANSLATE_URL")
            && !url.is_empty()
        {
            self.output.translate_url = url;
        }

        self
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.backend.temperature) {
            return Err(DrishtiError::ConfigInvalidValue {
                key: "backend.temperature".to_string(),
                message: format!("{} is outside [0, 1]", self.backend.temperature),
            });
        }
        if self.backend.n_predict == 0 {
            return Err(DrishtiError::ConfigInvalidValue {
                key: "backend.n_predict".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.backend.timeout_secs == 0 {
            return Err(DrishtiError::ConfigInvalidValue {
                key: "backend.timeout_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.camera.read_attempts == 0 {
            return Err(DrishtiError::ConfigInvalidValue {
                key: "camera.read_attempts".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/drishti/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drishti")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_drishti_env() {
        remove_env("DRISHTI_SOCKET");
        remove_env("DRISHTI_BACKEND");
        remove_env("DRISHTI_CAMERA");
        remove_env("DRISHTI_TRANSLATE_URL");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.camera.index, 0);
        assert_eq!(config.camera.warmup_frames, 5);
        assert_eq!(config.camera.stale_frames, 4);
        assert_eq!(config.backend.kind, BackendKind::Remote);
        assert_eq!(config.backend.socket, PathBuf::from("/tmp/vision.sock"));
        assert_eq!(config.backend.framing, Framing::LengthPrefixed);
        assert_eq!(config.backend.n_predict, 64);
        assert_eq!(config.backend.timeout_secs, 60);
        assert_eq!(config.output.languages, vec!["hi", "kn"]);
        assert!(config.output.translate);
        assert_eq!(config.speech.rate, 180);
        assert!(!config.ocr.enabled);
        assert_eq!(config.evidence.session_log, PathBuf::from("session_log.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [camera]
            index = 2
            warmup_frames = 10

            [backend]
            kind = "completion"
            socket = "/run/user/1000/vision.sock"
            framing = "legacy"
            n_predict = 256
            temperature = 0.5
            completion_url = "http://127.0.0.1:9000/completion"

            [output]
            languages = ["hi"]
            translate = false

            [ocr]
            enabled = true
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.camera.index, 2);
        assert_eq!(config.camera.warmup_frames, 10);
        assert_eq!(config.backend.kind, BackendKind::Completion);
        assert_eq!(
            config.backend.socket,
            PathBuf::from("/run/user/1000/vision.sock")
        );
        assert_eq!(config.backend.framing, Framing::Legacy);
        assert_eq!(config.backend.n_predict, 256);
        assert_eq!(config.backend.temperature, 0.5);
        assert_eq!(config.output.languages, vec!["hi"]);
        assert!(!config.output.translate);
        assert!(config.ocr.enabled);
        // Untouched sections keep defaults
        assert_eq!(config.speech, SpeechConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = Config::default();
        config.backend.temperature = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backend.temperature"));
    }

    #[test]
    fn test_validate_rejects_zero_n_predict() {
        let mut config = Config::default();
        config.backend.n_predict = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_socket_and_backend() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_drishti_env();

        set_env("DRISHTI_SOCKET", "/tmp/other.sock");
        set_env("DRISHTI_BACKEND", "completion");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.backend.socket, PathBuf::from("/tmp/other.sock"));
        assert_eq!(config.backend.kind, BackendKind::Completion);

        clear_drishti_env();
    }

    #[test]
    fn test_env_override_camera_ignores_garbage() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_drishti_env();

        set_env("DRISHTI_CAMERA", "not-a-number");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.camera.index, 0);

        set_env("DRISHTI_CAMERA", "3");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.camera.index, 3);

        clear_drishti_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [camera
            index = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_drishti_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("drishti"));
        assert!(path_str.ends_with("config.toml"));
    }
}
