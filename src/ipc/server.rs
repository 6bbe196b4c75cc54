//! Async Unix socket server for the inference protocol.

use crate::error::{DrishtiError, Result};
use crate::ipc::framing::{Framing, read_message, write_message};
use crate::ipc::protocol::{Request, Response};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

/// Handler trait for processing inference requests.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a well-formed request. Failures are returned as `success:false`.
    async fn handle(&self, request: Request) -> Response;
}

/// Shutdown flag shared by the socket servers.
#[derive(Debug, Clone)]
pub(crate) struct ServerState {
    shutdown: Arc<Mutex<bool>>,
}

impl ServerState {
    pub(crate) fn new() -> Self {
        Self {
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    async fn is_shutdown(&self) -> bool {
        *self.shutdown.lock().await
    }

    pub(crate) async fn set_shutdown(&self) {
        *self.shutdown.lock().await = true;
    }

    /// Accept connections until shutdown, spawning `on_connection` for each.
    pub(crate) async fn accept_loop<F, Fut>(
        &self,
        listener: &UnixListener,
        on_connection: F,
    ) -> Result<()>
    where
        F: Fn(UnixStream) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        loop {
            if self.is_shutdown().await {
                break;
            }

            // Accept with a timeout so the shutdown flag is polled
            let accept_result =
                tokio::time::timeout(tokio::time::Duration::from_millis(100), listener.accept())
                    .await;

            match accept_result {
                Ok(Ok((stream, _))) => {
                    let task = on_connection(stream);
                    tokio::spawn(async move {
                        if let Err(e) = task.await {
                            tracing::warn!("Error handling client: {}", e);
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(DrishtiError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => continue,
            }
        }

        Ok(())
    }
}

/// Bind a listener, replacing a stale socket file.
pub(crate) fn bind_listener(socket_path: &Path) -> Result<UnixListener> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path).map_err(|e| DrishtiError::IpcSocket {
            message: format!("Failed to remove existing socket: {}", e),
        })?;
    }

    UnixListener::bind(socket_path).map_err(|e| DrishtiError::IpcSocket {
        message: format!("Failed to bind to socket {}: {}", socket_path.display(), e),
    })
}

/// Remove a socket file if it is still present.
pub(crate) fn remove_socket(socket_path: &Path) -> Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path).map_err(|e| DrishtiError::IpcSocket {
            message: format!("Failed to remove socket file: {}", e),
        })?;
    }
    Ok(())
}

/// Inference server: one request and one response per connection.
pub struct IpcServer {
    socket_path: PathBuf,
    framing: Framing,
    state: ServerState,
}

impl IpcServer {
    /// Create a new server for the given socket path and framing.
    pub fn new(socket_path: PathBuf, framing: Framing) -> Result<Self> {
        Ok(Self {
            socket_path,
            framing,
            state: ServerState::new(),
        })
    }

    /// Get the socket path this server is using.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Bind the socket and serve until [`stop`](Self::stop) is called.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: RequestHandler + 'static,
    {
        let listener = bind_listener(&self.socket_path)?;
        let handler = Arc::new(handler);
        let framing = self.framing;

        self.state
            .accept_loop(&listener, move |stream| {
                handle_client(stream, framing, Arc::clone(&handler))
            })
            .await
    }

    /// Stop the server and clean up the socket file.
    pub async fn stop(&self) -> Result<()> {
        self.state.set_shutdown().await;
        remove_socket(&self.socket_path)
    }
}

/// Serve a single connection: read one request, answer it, close.
async fn handle_client<H>(stream: UnixStream, framing: Framing, handler: Arc<H>) -> Result<()>
where
    H: RequestHandler + ?Sized,
{
    let (mut reader, mut writer) = stream.into_split();

    let response = match read_message(&mut reader, framing).await {
        Ok(bytes) => match Request::parse(&bytes) {
            Ok(request) => {
                tracing::debug!(id = request.id, op = request.operation.name(), "request");
                handler.handle(request).await
            }
            Err(bad) => {
                tracing::warn!(id = bad.id, "{}", bad.message);
                bad.into()
            }
        },
        Err(e @ DrishtiError::IpcConnection { .. }) => return Err(e),
        Err(e) => {
            tracing::warn!("Unreadable request: {}", e);
            Response::failure(0, e.to_string())
        }
    };

    let response_json = response.to_json().map_err(|e| DrishtiError::IpcProtocol {
        message: format!("Failed to serialize response: {}", e),
    })?;

    write_message(&mut writer, framing, response_json.as_bytes()).await
}
