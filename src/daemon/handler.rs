//! Request handler for the inference server.

use crate::backend::{GenerationOptions, InferenceBackend, MockBackend, build_in_process};
use crate::config::{BackendConfig, BackendKind};
use crate::error::{DrishtiError, Result};
use crate::frame::Frame;
use crate::ipc::protocol::{Operation, Request, Response};
use crate::ipc::server::RequestHandler;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Loads the backend named by an `init` request.
#[async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self, model_path: &str) -> Result<Arc<dyn InferenceBackend>>;
}

/// Loader driven by the `[backend]` configuration section.
pub struct ConfigLoader {
    config: BackendConfig,
}

impl ConfigLoader {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BackendLoader for ConfigLoader {
    async fn load(&self, model_path: &str) -> Result<Arc<dyn InferenceBackend>> {
        let options = GenerationOptions::from(&self.config);
        match self.config.kind {
            BackendKind::Moondream => build_in_process(model_path, options).await,
            BackendKind::Mock => Ok(Arc::new(MockBackend::new("mock"))),
            BackendKind::Completion => crate::backend::build_backend(&self.config).await,
            // Serving a remote backend would forward to ourselves.
            BackendKind::Remote => Err(DrishtiError::ConfigInvalidValue {
                key: "backend.kind".to_string(),
                message: "the server needs a local backend (moondream, completion or mock)"
                    .to_string(),
            }),
        }
    }
}

struct Loaded {
    model_path: String,
    backend: Arc<dyn InferenceBackend>,
}

/// Serves `init`, `clear_kv_cache` and `infer` against one loaded backend.
///
/// Requests run one at a time; concurrent connections wait on the model lock.
pub struct InferenceRequestHandler {
    loader: Arc<dyn BackendLoader>,
    defaults: GenerationOptions,
    loaded: Mutex<Option<Loaded>>,
}

impl InferenceRequestHandler {
    pub fn new(loader: Arc<dyn BackendLoader>, defaults: GenerationOptions) -> Self {
        Self {
            loader,
            defaults,
            loaded: Mutex::new(None),
        }
    }

    /// Model path of the loaded backend, if any.
    pub async fn model_path(&self) -> Option<String> {
        self.loaded.lock().await.as_ref().map(|l| l.model_path.clone())
    }

    async fn init(&self, model_path: &str) -> Result<()> {
        let mut loaded = self.loaded.lock().await;
        if let Some(current) = loaded.as_ref() {
            if current.model_path == model_path {
                tracing::debug!(model_path, "Model already loaded");
                return Ok(());
            }
            return Err(DrishtiError::Backend {
                message: format!(
                    "Model already initialised with '{}', refusing '{}'",
                    current.model_path, model_path
                ),
            });
        }

        tracing::info!(model_path, "Loading model");
        let backend = self.loader.load(model_path).await?;
        tracing::info!(backend = backend.name(), "Model loaded");
        *loaded = Some(Loaded {
            model_path: model_path.to_string(),
            backend,
        });
        Ok(())
    }

    async fn clear_kv_cache(&self) -> Result<()> {
        match self.loaded.lock().await.as_ref() {
            Some(current) => current.backend.reset().await,
            None => Ok(()),
        }
    }

    async fn infer(
        &self,
        image_path: &str,
        prompt: &str,
        n_predict: u32,
        temperature: Option<f32>,
    ) -> Result<String> {
        let loaded = self.loaded.lock().await;
        let current = loaded.as_ref().ok_or_else(|| DrishtiError::Backend {
            message: "Model not initialised; send init first".to_string(),
        })?;

        let path = PathBuf::from(image_path);
        let frame = tokio::task::spawn_blocking(move || Frame::from_image_file(&path))
            .await
            .map_err(|e| DrishtiError::Other(format!("Image loading task failed: {}", e)))??;

        let options = GenerationOptions {
            n_predict: n_predict.max(1),
            temperature: temperature.unwrap_or(self.defaults.temperature),
        };
        current.backend.infer_with(&frame, prompt, options).await
    }
}

#[async_trait]
impl RequestHandler for InferenceRequestHandler {
    async fn handle(&self, request: Request) -> Response {
        let id = request.id;
        let operation = request.operation.name();
        let result = match request.operation {
            Operation::Init { model_path } => self.init(&model_path).await.map(|()| None),
            Operation::ClearKvCache {} => self.clear_kv_cache().await.map(|()| None),
            Operation::Infer {
                image_path,
                prompt,
                n_predict,
                temperature,
            } => self
                .infer(&image_path, &prompt, n_predict, temperature)
                .await
                .map(Some),
        };

        match result {
            Ok(None) => Response::ok(id),
            Ok(Some(text)) => Response::text(id, text),
            Err(e) => {
                tracing::warn!(id, operation, "Request failed: {}", e);
                Response::failure(id, e.to_string())
            }
        }
    }
}
