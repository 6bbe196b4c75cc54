//! Control socket used by `drishti trigger` to drive a running assistant.
//!
//! Newline-delimited JSON, one command and one response per connection:
//!
//! ```text
//! → {"type":"trigger","mode":"describe_once"}
//! ← {"type":"accepted"}
//! ```

use crate::error::{DrishtiError, Result};
use crate::ipc::server::{ServerState, bind_listener, remove_socket};
use crate::pipeline::controller::PipelineState;
use crate::pipeline::trigger::Mode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Command sent to a running assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Fire a trigger as if its key had been pressed
    Trigger { mode: Mode },
    /// Query the controller state
    Status,
}

/// Reply from a running assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
    Accepted,
    /// A trigger was already in flight; this one was dropped
    Busy,
    Status { state: PipelineState },
    Error { message: String },
}

impl ControlCommand {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ControlResponse {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Handler trait for control commands.
#[async_trait::async_trait]
pub trait ControlHandler: Send + Sync {
    async fn handle(&self, command: ControlCommand) -> ControlResponse;
}

/// Default control socket path based on XDG_RUNTIME_DIR or fallback.
pub fn default_control_socket_path() -> PathBuf {
    if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(xdg_runtime).join("drishti.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/drishti-{}.sock", uid))
    }
}

/// Server side of the control socket.
pub struct ControlServer {
    socket_path: PathBuf,
    state: ServerState,
}

impl ControlServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            state: ServerState::new(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve until [`stop`](Self::stop) is called.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: ControlHandler + 'static,
    {
        let listener = bind_listener(&self.socket_path)?;
        let handler = Arc::new(handler);

        self.state
            .accept_loop(&listener, move |stream| {
                handle_client(stream, Arc::clone(&handler))
            })
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.state.set_shutdown().await;
        remove_socket(&self.socket_path)
    }
}

async fn handle_client<H>(stream: UnixStream, handler: Arc<H>) -> Result<()>
where
    H: ControlHandler + ?Sized,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader
        .read_line(&mut line)
        .await
        .map_err(|e| DrishtiError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let response = match ControlCommand::from_json(line.trim()) {
        Ok(command) => handler.handle(command).await,
        Err(e) => ControlResponse::Error {
            message: format!("Failed to parse command: {}", e),
        },
    };

    write_line(&mut writer, &response.to_json()?).await
}

async fn write_line<W>(writer: &mut W, json: &str) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| DrishtiError::IpcConnection {
            message: format!("Failed to write to peer: {}", e),
        })?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| DrishtiError::IpcConnection {
            message: format!("Failed to write newline to peer: {}", e),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| DrishtiError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })
}

/// Send a command to a running assistant via its control socket.
///
/// # Errors
/// Returns `DrishtiError::IpcConnection` if no assistant is listening.
/// Returns `DrishtiError::IpcProtocol` if the reply cannot be parsed.
pub async fn send_control_command(
    socket_path: &Path,
    command: ControlCommand,
) -> Result<ControlResponse> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| DrishtiError::IpcConnection {
            message: format!("Failed to connect to assistant: {}", e),
        })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let command_json = command.to_json().map_err(|e| DrishtiError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;
    write_line(&mut writer, &command_json).await?;

    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .await
        .map_err(|e| DrishtiError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;

    ControlResponse::from_json(response_line.trim()).map_err(|e| DrishtiError::IpcProtocol {
        message: format!("Failed to deserialize response: {}", e),
    })
}
