//! Inference backends: turn a frame and a prompt into text.

#[cfg(feature = "http")]
pub mod completion;
#[cfg(feature = "moondream")]
pub mod moondream;
pub mod remote;

use crate::config::{BackendConfig, BackendKind};
use crate::defaults;
use crate::error::{DrishtiError, Result};
use crate::frame::Frame;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use remote::RemoteBackend;

/// Generation bounds passed to backends that honour them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub n_predict: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            n_predict: defaults::N_PREDICT,
            temperature: defaults::TEMPERATURE,
        }
    }
}

impl From<&BackendConfig> for GenerationOptions {
    fn from(config: &BackendConfig) -> Self {
        Self {
            n_predict: config.n_predict,
            temperature: config.temperature,
        }
    }
}

/// Trait for vision-language inference.
///
/// Callers never run two inferences on one backend at the same time.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Answer `prompt` about `frame`.
    async fn infer(&self, frame: &Frame, prompt: &str) -> Result<String>;

    /// Answer with explicit generation bounds. Backends without knobs ignore them.
    async fn infer_with(
        &self,
        frame: &Frame,
        prompt: &str,
        _options: GenerationOptions,
    ) -> Result<String> {
        self.infer(frame, prompt).await
    }

    /// Drop any state carried between calls.
    async fn reset(&self) -> Result<()> {
        Ok(())
    }

    /// Name for logs.
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl<T: InferenceBackend + ?Sized> InferenceBackend for Arc<T> {
    async fn infer(&self, frame: &Frame, prompt: &str) -> Result<String> {
        (**self).infer(frame, prompt).await
    }

    async fn infer_with(
        &self,
        frame: &Frame,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String> {
        (**self).infer_with(frame, prompt, options).await
    }

    async fn reset(&self) -> Result<()> {
        (**self).reset().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Whether a backend answer is worth routing to the user.
///
/// Empty answers and answers starting with `Error` (as failing backends
/// report themselves in-band) are not.
pub fn is_usable_answer(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && !trimmed.starts_with("Error")
}

/// Build the backend selected in configuration.
///
/// The remote backend performs its `init` handshake here, so an unreachable
/// server fails start-up.
pub async fn build_backend(config: &BackendConfig) -> Result<Arc<dyn InferenceBackend>> {
    match config.kind {
        BackendKind::Remote => Ok(Arc::new(RemoteBackend::connect(config).await?)),
        BackendKind::Completion => build_completion(config),
        BackendKind::Moondream => {
            build_in_process(&config.model_path, GenerationOptions::from(config)).await
        }
        BackendKind::Mock => Ok(Arc::new(MockBackend::new("mock"))),
    }
}

#[cfg(feature = "http")]
fn build_completion(config: &BackendConfig) -> Result<Arc<dyn InferenceBackend>> {
    Ok(Arc::new(completion::CompletionBackend::new(
        &config.completion_url,
        GenerationOptions::from(config),
        Duration::from_secs(config.timeout_secs),
    )?))
}

#[cfg(not(feature = "http"))]
fn build_completion(_config: &BackendConfig) -> Result<Arc<dyn InferenceBackend>> {
    Err(DrishtiError::Backend {
        message: "Completion backend requires the 'http' feature".to_string(),
    })
}

/// Load the in-process model, off the async runtime.
#[cfg(feature = "moondream")]
pub async fn build_in_process(
    model_path: &str,
    options: GenerationOptions,
) -> Result<Arc<dyn InferenceBackend>> {
    let model_path = model_path.to_string();
    let backend = tokio::task::spawn_blocking(move || {
        moondream::MoondreamBackend::load(&model_path, options)
    })
    .await
    .map_err(|e| DrishtiError::Backend {
        message: format!("Model loading task failed: {}", e),
    })??;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "moondream"))]
pub async fn build_in_process(
    model_path: &str,
    _options: GenerationOptions,
) -> Result<Arc<dyn InferenceBackend>> {
    Err(DrishtiError::ModelNotFound {
        path: format!("{} (built without the 'moondream' feature)", model_path),
    })
}

/// Scripted backend for tests and demos.
#[derive(Debug, Clone)]
pub struct MockBackend {
    name: String,
    response: String,
    failure: Option<MockFailure>,
    delay: Option<Duration>,
    prompts: Arc<Mutex<Vec<String>>>,
    resets: Arc<Mutex<u32>>,
}

#[derive(Debug, Clone, Copy)]
enum MockFailure {
    Backend,
    Protocol,
    Timeout,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            response: "mock description".to_string(),
            failure: None,
            delay: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(Mutex::new(0)),
        }
    }

    /// Answer every prompt with `response`.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Fail with a well-formed backend error.
    pub fn with_failure(mut self) -> Self {
        self.failure = Some(MockFailure::Backend);
        self
    }

    /// Fail as if the server sent garbage.
    pub fn with_protocol_failure(mut self) -> Self {
        self.failure = Some(MockFailure::Protocol);
        self
    }

    /// Fail as if the server never answered.
    pub fn with_timeout(mut self) -> Self {
        self.failure = Some(MockFailure::Timeout);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of `reset` calls so far.
    pub fn resets(&self) -> u32 {
        *self.resets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl InferenceBackend for MockBackend {
    async fn infer(&self, _frame: &Frame, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.failure {
            None => Ok(self.response.clone()),
            Some(MockFailure::Backend) => Err(DrishtiError::Backend {
                message: "mock inference failure".to_string(),
            }),
            Some(MockFailure::Protocol) => Err(DrishtiError::IpcProtocol {
                message: "mock garbage response".to_string(),
            }),
            Some(MockFailure::Timeout) => Err(DrishtiError::BackendTimeout {
                seconds: defaults::INFERENCE_TIMEOUT_SECS,
            }),
        }
    }

    async fn reset(&self) -> Result<()> {
        *self.resets.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn frame() -> Frame {
        Frame::filled(4, 4, [255, 0, 0]).unwrap()
    }

    #[test]
    fn test_usable_answer_rules() {
        assert!(is_usable_answer("a red ball"));
        assert!(!is_usable_answer(""));
        assert!(!is_usable_answer("   \n"));
        assert!(!is_usable_answer("Error: model crashed"));
        // Only the exact prefix counts
        assert!(is_usable_answer("error bars on a chart"));
    }

    #[tokio::test]
    async fn test_mock_backend_returns_response_and_records_prompt() {
        let backend = MockBackend::new("test").with_response("a red ball");
        let text = backend.infer(&frame(), "Describe").await.unwrap();
        assert_eq!(text, "a red ball");
        assert_eq!(backend.prompts(), vec!["Describe".to_string()]);
        assert_eq!(backend.name(), "test");
    }

    #[tokio::test]
    async fn test_mock_backend_failure_kinds() {
        let err = MockBackend::new("m")
            .with_failure()
            .infer(&frame(), "p")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);

        let err = MockBackend::new("m")
            .with_protocol_failure()
            .infer(&frame(), "p")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let err = MockBackend::new("m")
            .with_timeout()
            .infer(&frame(), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, DrishtiError::BackendTimeout { seconds: 60 }));
    }

    #[tokio::test]
    async fn test_arc_backend_delegates() {
        let mock = MockBackend::new("shared").with_response("ok");
        let shared: Arc<dyn InferenceBackend> = Arc::new(mock.clone());
        shared.reset().await.unwrap();
        let text = shared
            .infer_with(&frame(), "p", GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "ok");
        assert_eq!(mock.resets(), 1);
    }

    #[tokio::test]
    async fn test_build_mock_backend_from_config() {
        let config = BackendConfig {
            kind: BackendKind::Mock,
            ..BackendConfig::default()
        };
        let backend = build_backend(&config).await.unwrap();
        assert_eq!(backend.name(), "mock");
    }

    #[test]
    fn test_generation_options_from_config() {
        let config = BackendConfig {
            n_predict: 32,
            temperature: 0.5,
            ..BackendConfig::default()
        };
        let options = GenerationOptions::from(&config);
        assert_eq!(options.n_predict, 32);
        assert_eq!(options.temperature, 0.5);
    }
}
