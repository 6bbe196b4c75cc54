//! Protocol client for the long-lived inference server.
//!
//! Each call opens a fresh connection, sends one request and reads the paired
//! response, so the protocol stays stateless apart from `init` and
//! `clear_kv_cache`.

use crate::defaults::INFERENCE_TIMEOUT_SECS;
use crate::error::{DrishtiError, Result};
use crate::ipc::framing::{Framing, read_message, write_message};
use crate::ipc::protocol::{Operation, Request, Response};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::UnixStream;

/// Send one request over a new connection and return the raw response.
///
/// # Errors
/// Returns `DrishtiError::IpcConnection` if the server cannot be reached.
/// Returns `DrishtiError::IpcProtocol` if the reply is not a well-formed response.
pub async fn send_request(
    socket_path: &Path,
    framing: Framing,
    request: &Request,
) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| DrishtiError::IpcConnection {
            message: format!(
                "Failed to connect to inference server at {}: {}",
                socket_path.display(),
                e
            ),
        })?;

    let (mut reader, mut writer) = stream.into_split();

    let request_json = request.to_json().map_err(|e| DrishtiError::IpcProtocol {
        message: format!("Failed to serialize request: {}", e),
    })?;
    write_message(&mut writer, framing, request_json.as_bytes()).await?;

    let bytes = read_message(&mut reader, framing).await?;
    Response::from_slice(&bytes).map_err(|e| DrishtiError::IpcProtocol {
        message: format!("Failed to deserialize response: {}", e),
    })
}

/// Client bound to one server socket, assigning monotonically increasing ids.
#[derive(Debug)]
pub struct ProtocolClient {
    socket_path: PathBuf,
    framing: Framing,
    timeout: Duration,
    last_id: AtomicU64,
}

impl ProtocolClient {
    pub fn new(socket_path: impl Into<PathBuf>, framing: Framing) -> Self {
        Self {
            socket_path: socket_path.into(),
            framing,
            timeout: Duration::from_secs(INFERENCE_TIMEOUT_SECS),
            last_id: AtomicU64::new(0),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Send an operation and wait for its paired response.
    ///
    /// A well-formed `success:false` reply is returned as `Ok`; callers decide
    /// how to surface it.
    pub async fn call(&self, operation: Operation) -> Result<Response> {
        let request = Request::new(self.next_id(), operation);
        let exchange = send_request(&self.socket_path, self.framing, &request);

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DrishtiError::BackendTimeout {
                seconds: self.timeout.as_secs(),
            })??;

        if response.id != request.id {
            return Err(DrishtiError::IpcProtocol {
                message: format!(
                    "Response id {} does not match request id {}",
                    response.id, request.id
                ),
            });
        }

        Ok(response)
    }

    /// Load the model on the server. Must precede any `infer`.
    pub async fn initialize(&self, model_path: &str) -> Result<()> {
        let response = self
            .call(Operation::Init {
                model_path: model_path.to_string(),
            })
            .await?;
        expect_success(response).map(|_| ())
    }

    /// Drop any cross-request state held by the server.
    pub async fn clear_kv_cache(&self) -> Result<()> {
        let response = self.call(Operation::ClearKvCache {}).await?;
        expect_success(response).map(|_| ())
    }

    /// Run inference on an image the server can read from `image_path`.
    pub async fn infer(
        &self,
        image_path: &Path,
        prompt: &str,
        n_predict: u32,
        temperature: Option<f32>,
    ) -> Result<String> {
        let response = self
            .call(Operation::Infer {
                image_path: image_path.to_string_lossy().into_owned(),
                prompt: prompt.to_string(),
                n_predict,
                temperature,
            })
            .await?;

        match expect_success(response)? {
            Some(result) => Ok(result.text),
            None => Err(DrishtiError::IpcProtocol {
                message: "Successful infer response carried no result".to_string(),
            }),
        }
    }
}

/// Turn a `success:false` reply into a backend error.
fn expect_success(response: Response) -> Result<Option<crate::ipc::protocol::InferResult>> {
    if response.success {
        Ok(response.result)
    } else {
        Err(DrishtiError::Backend {
            message: response
                .error
                .unwrap_or_else(|| "Server reported failure without a message".to_string()),
        })
    }
}
