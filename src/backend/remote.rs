//! Backend that delegates to the long-lived inference server.

use crate::backend::{GenerationOptions, InferenceBackend};
use crate::config::BackendConfig;
use crate::error::{DrishtiError, Result};
use crate::frame::Frame;
use crate::ipc::client::ProtocolClient;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Remote backend speaking the socket protocol.
///
/// The frame is handed over as a file at `scratch_image`, which the server
/// must be able to read.
#[derive(Debug)]
pub struct RemoteBackend {
    client: ProtocolClient,
    scratch_image: PathBuf,
    options: GenerationOptions,
}

impl RemoteBackend {
    /// Create a backend without performing the `init` handshake.
    pub fn new(client: ProtocolClient, scratch_image: PathBuf, options: GenerationOptions) -> Self {
        Self {
            client,
            scratch_image,
            options,
        }
    }

    /// Connect and initialize the server's model.
    ///
    /// # Errors
    /// Fails when the server is unreachable or refuses the model path.
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let client = ProtocolClient::new(&config.socket, config.framing)
            .with_timeout(Duration::from_secs(config.timeout_secs));
        let backend = Self::new(
            client,
            config.scratch_image.clone(),
            GenerationOptions::from(config),
        );
        backend.initialize(&config.model_path).await?;
        Ok(backend)
    }

    /// Send `init` for `model_path`.
    pub async fn initialize(&self, model_path: &str) -> Result<()> {
        tracing::info!(
            socket = %self.client.socket_path().display(),
            model_path,
            "Initializing inference server"
        );
        self.client.initialize(model_path).await
    }

    pub fn scratch_image(&self) -> &Path {
        &self.scratch_image
    }

    async fn write_scratch(&self, frame: &Frame) -> Result<()> {
        let frame = frame.clone();
        let path = self.scratch_image.clone();
        tokio::task::spawn_blocking(move || frame.save(&path))
            .await
            .map_err(|e| DrishtiError::Other(format!("Scratch image task failed: {}", e)))?
    }
}

#[async_trait::async_trait]
impl InferenceBackend for RemoteBackend {
    async fn infer(&self, frame: &Frame, prompt: &str) -> Result<String> {
        self.infer_with(frame, prompt, self.options).await
    }

    async fn infer_with(
        &self,
        frame: &Frame,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String> {
        self.write_scratch(frame).await?;

        // Every request starts from a clean cache
        self.client.clear_kv_cache().await?;

        self.client
            .infer(
                &self.scratch_image,
                prompt,
                options.n_predict,
                Some(options.temperature),
            )
            .await
    }

    async fn reset(&self) -> Result<()> {
        self.client.clear_kv_cache().await
    }

    fn name(&self) -> &str {
        "remote"
    }
}
