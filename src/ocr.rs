//! Optical character recognition, tried before the vision model when reading text.

use crate::config::OcrConfig;
use crate::error::{DrishtiError, Result};
use crate::exec::CommandExecutor;
use crate::frame::Frame;
use std::path::Path;
use std::sync::Arc;

/// Text recognizer over image files.
pub trait OcrEngine: Send + Sync {
    /// Recognized text, or `None` when the image holds no readable text.
    fn recognize(&self, image: &Path) -> Result<Option<String>>;

    fn name(&self) -> &str;
}

/// Tesseract CLI: `tesseract <image> stdout -l <languages>`.
pub struct TesseractOcr {
    executor: Arc<dyn CommandExecutor>,
    command: String,
    languages: String,
}

impl TesseractOcr {
    pub fn new(executor: Arc<dyn CommandExecutor>, command: &str, languages: &str) -> Self {
        Self {
            executor,
            command: command.to_string(),
            languages: languages.to_string(),
        }
    }

    pub fn from_config(config: &OcrConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self::new(executor, &config.command, &config.languages)
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &Path) -> Result<Option<String>> {
        let image = image.to_string_lossy().into_owned();
        let stdout = self
            .executor
            .execute(
                &self.command,
                &[image.as_str(), "stdout", "-l", self.languages.as_str()],
            )
            .map_err(|e| DrishtiError::Ocr {
                message: e.to_string(),
            })?;

        let text = stdout.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    fn name(&self) -> &str {
        &self.command
    }
}

/// Write `frame` to a temporary PNG and run OCR on it off the async runtime.
pub async fn recognize_frame(engine: Arc<dyn OcrEngine>, frame: &Frame) -> Result<Option<String>> {
    let frame = frame.clone();
    tokio::task::spawn_blocking(move || {
        let image = tempfile::Builder::new()
            .prefix("drishti-ocr-")
            .suffix(".png")
            .tempfile()?;
        frame.save(image.path())?;
        engine.recognize(image.path())
    })
    .await
    .map_err(|e| DrishtiError::Ocr {
        message: format!("OCR task failed: {}", e),
    })?
}
