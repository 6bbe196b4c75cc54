//! Machine translation of backend answers.

use crate::defaults::FALLBACK_SOURCE_LANGUAGE;
use crate::error::{DrishtiError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Source language that asks the service to detect it.
pub const AUTO_SOURCE: &str = "auto";

/// External translation service.
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` (a code or `auto`) into `target`.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Translate with one retry, never failing.
///
/// The first attempt lets the service detect the source language; the retry
/// forces English. If both fail the original text is returned and a warning
/// is logged.
pub async fn translate_with_fallback(
    translator: &dyn Translator,
    text: &str,
    target: &str,
) -> String {
    match translator.translate(text, AUTO_SOURCE, target).await {
        Ok(translated) => return translated,
        Err(e) => tracing::debug!(target_language = target, "Translation failed, retrying: {}", e),
    }

    match translator
        .translate(text, FALLBACK_SOURCE_LANGUAGE, target)
        .await
    {
        Ok(translated) => translated,
        Err(e) => {
            tracing::warn!(
                target_language = target,
                translator = translator.name(),
                "Translation failed, speaking original text: {}",
                e
            );
            text.to_string()
        }
    }
}

/// LibreTranslate-compatible HTTP translator.
#[cfg(feature = "http")]
pub struct HttpTranslator {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http")]
#[derive(serde::Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[cfg(feature = "http")]
#[derive(serde::Deserialize)]
struct TranslateReply {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[cfg(feature = "http")]
impl HttpTranslator {
    pub fn new(url: &str, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DrishtiError::Translation {
                target: String::new(),
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[cfg(feature = "http")]
#[async_trait::async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let fail = |message: String| DrishtiError::Translation {
            target: target.to_string(),
            message,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&TranslateRequest {
                q: text,
                source,
                target,
                format: "text",
            })
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(fail(format!("service returned status {}", response.status())));
        }

        let reply: TranslateReply = response
            .json()
            .await
            .map_err(|e| fail(format!("unexpected reply: {e}")))?;

        if reply.translated_text.trim().is_empty() {
            return Err(fail("empty translation".to_string()));
        }
        Ok(reply.translated_text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Table-driven translator for tests and offline demos.
#[derive(Debug, Default)]
pub struct MockTranslator {
    translations: HashMap<String, String>,
    failures_left: Mutex<u32>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `target` with `text`.
    pub fn with_translation(mut self, target: &str, text: &str) -> Self {
        self.translations
            .insert(target.to_string(), text.to_string());
        self
    }

    /// Fail the next `count` calls.
    pub fn with_failures(self, count: u32) -> Self {
        *self.failures_left.lock().unwrap_or_else(|e| e.into_inner()) = count;
        self
    }

    /// `(source, target)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((source.to_string(), target.to_string()));

        {
            let mut failures = self.failures_left.lock().unwrap_or_else(|e| e.into_inner());
            if *failures > 0 {
                *failures -= 1;
                return Err(DrishtiError::Translation {
                    target: target.to_string(),
                    message: "mock translation failure".to_string(),
                });
            }
        }

        Ok(self
            .translations
            .get(target)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target, text)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn primary_success_uses_auto_source() {
        let translator = MockTranslator::new().with_translation("hi", "लाल गेंद");
        let text = translate_with_fallback(&translator, "a red ball", "hi").await;
        assert_eq!(text, "लाल गेंद");
        assert_eq!(
            translator.calls(),
            vec![("auto".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn retry_forces_english_source() {
        let translator = MockTranslator::new()
            .with_translation("kn", "ಕೆಂಪು ಚೆಂಡು")
            .with_failures(1);
        let text = translate_with_fallback(&translator, "a red ball", "kn").await;
        assert_eq!(text, "ಕೆಂಪು ಚೆಂಡು");
        assert_eq!(
            translator.calls(),
            vec![
                ("auto".to_string(), "kn".to_string()),
                ("en".to_string(), "kn".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn double_failure_returns_original() {
        let translator = MockTranslator::new().with_failures(2);
        let text = translate_with_fallback(&translator, "a red ball", "hi").await;
        assert_eq!(text, "a red ball");
        assert_eq!(translator.calls().len(), 2);
    }

    #[tokio::test]
    async fn mock_without_table_entry_tags_text() {
        let translator = MockTranslator::new();
        let text = translator.translate("hello", "auto", "ta").await.unwrap();
        assert_eq!(text, "[ta] hello");
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn http_translator_unreachable_is_translation_error() {
        let translator =
            HttpTranslator::new("http://127.0.0.1:1/translate", std::time::Duration::from_secs(2))
                .unwrap();
        let err = translator.translate("hi", "auto", "kn").await.unwrap_err();
        assert!(matches!(err, DrishtiError::Translation { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Translation);
    }
}
