//! Evidence logging: the captured frame plus an append-only record of what
//! was asked and answered.
//!
//! Logging runs off the interactive path and is best-effort. A record whose
//! background write has not finished when the process exits is lost.

use crate::config::EvidenceConfig;
use crate::defaults::SESSION_RULE_WIDTH;
use crate::error::{DrishtiError, Result};
use crate::frame::Frame;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What kind of answer a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    SceneDescription,
    TextRead,
    CurrencyId,
    Ocr,
    VlmFallback,
}

impl Modality {
    pub fn tag(self) -> &'static str {
        match self {
            Modality::SceneDescription => "scene-description",
            Modality::TextRead => "text-read",
            Modality::CurrencyId => "currency-id",
            Modality::Ocr => "ocr",
            Modality::VlmFallback => "vlm-fallback",
        }
    }
}

/// One interaction, as handed to the logger.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Local>,
    pub modality: Modality,
    pub prompt: String,
    pub text: String,
}

/// One line of the daily JSONL log.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub modality: Modality,
    pub text: String,
    pub prompt: String,
    pub image_path: String,
}

/// Persists evidence. Implementations block; call through [`spawn_log`].
pub trait EvidenceLogger: Send + Sync {
    /// Store the frame and the record, returning where the image went.
    fn log(&self, frame: &Frame, record: &InteractionRecord) -> Result<PathBuf>;
}

/// Image file name for a capture time, unique to the microsecond.
pub fn image_file_name(timestamp: &DateTime<Local>) -> String {
    format!("capture_{}.jpg", timestamp.format("%Y%m%d_%H%M%S_%6f"))
}

/// Daily log file name.
pub fn daily_log_name(timestamp: &DateTime<Local>) -> String {
    format!("log_{}.jsonl", timestamp.format("%Y-%m-%d"))
}

/// Plain-text block appended to the session log.
pub fn session_block(record: &InteractionRecord, image_path: &Path) -> String {
    format!(
        "Timestamp: {}\nPrompt: {}\nResponse: {}\nImage Path: {}\n{}\n",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.prompt,
        record.text,
        image_path.display(),
        "-".repeat(SESSION_RULE_WIDTH)
    )
}

fn log_error(what: &str, path: &Path, e: impl std::fmt::Display) -> DrishtiError {
    DrishtiError::EvidenceLog {
        message: format!("{} {}: {}", what, path.display(), e),
    }
}

fn append(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| log_error("Failed to create", parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| log_error("Failed to open", path, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| log_error("Failed to append to", path, e))
}

/// Writes images, daily JSONL and the session text log to disk.
#[derive(Debug, Clone)]
pub struct FileEvidenceLogger {
    image_dir: PathBuf,
    session_log: PathBuf,
    daily_log_dir: PathBuf,
}

impl FileEvidenceLogger {
    pub fn new(image_dir: PathBuf, session_log: PathBuf, daily_log_dir: PathBuf) -> Self {
        Self {
            image_dir,
            session_log,
            daily_log_dir,
        }
    }

    pub fn from_config(config: &EvidenceConfig) -> Self {
        Self::new(
            config.image_dir.clone(),
            config.session_log.clone(),
            config.daily_log_dir.clone(),
        )
    }
}

impl EvidenceLogger for FileEvidenceLogger {
    fn log(&self, frame: &Frame, record: &InteractionRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.image_dir)
            .map_err(|e| log_error("Failed to create", &self.image_dir, e))?;
        let image_path = self.image_dir.join(image_file_name(&record.timestamp));
        frame
            .save(&image_path)
            .map_err(|e| log_error("Failed to save", &image_path, e))?;

        let line = LogLine {
            timestamp: record.timestamp.to_rfc3339(),
            modality: record.modality,
            text: record.text.clone(),
            prompt: record.prompt.clone(),
            image_path: image_path.display().to_string(),
        };
        let mut json = serde_json::to_string(&line)?;
        json.push('\n');
        append(
            &self.daily_log_dir.join(daily_log_name(&record.timestamp)),
            &json,
        )?;

        append(&self.session_log, &session_block(record, &image_path))?;

        tracing::debug!(
            image = %image_path.display(),
            modality = record.modality.tag(),
            "Evidence logged"
        );
        Ok(image_path)
    }
}

/// A record captured by [`MemoryEvidenceLogger`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvidence {
    pub record: InteractionRecord,
    pub frame_size: (u32, u32),
    pub image_path: PathBuf,
}

/// In-memory logger for tests, optionally slow or failing.
#[derive(Clone, Default)]
pub struct MemoryEvidenceLogger {
    entries: Arc<Mutex<Vec<LoggedEvidence>>>,
    delay: Option<Duration>,
    fail: bool,
}

impl MemoryEvidenceLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block this long before recording.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every write.
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn entries(&self) -> Vec<LoggedEvidence> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl EvidenceLogger for MemoryEvidenceLogger {
    fn log(&self, frame: &Frame, record: &InteractionRecord) -> Result<PathBuf> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(DrishtiError::EvidenceLog {
                message: "disk full".to_string(),
            });
        }
        let image_path = PathBuf::from("memory").join(image_file_name(&record.timestamp));
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LoggedEvidence {
                record: record.clone(),
                frame_size: (frame.width(), frame.height()),
                image_path: image_path.clone(),
            });
        Ok(image_path)
    }
}

/// Log in the background. Failures are reported to the diagnostic log only.
///
/// The task owns its copy of the frame; the returned handle may be dropped.
pub fn spawn_log(
    logger: Arc<dyn EvidenceLogger>,
    frame: Frame,
    record: InteractionRecord,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = logger.log(&frame, &record) {
            tracing::warn!(modality = record.modality.tag(), "Evidence not saved: {}", e);
        }
    })
}
