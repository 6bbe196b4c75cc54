//! Inference server mode: keep a model loaded and answer protocol requests.

pub mod handler;

pub use handler::{BackendLoader, ConfigLoader, InferenceRequestHandler};

use crate::backend::GenerationOptions;
use crate::config::Config;
use crate::error::{DrishtiError, Result};
use crate::ipc::framing::Framing;
use crate::ipc::server::IpcServer;
use std::path::PathBuf;
use std::sync::Arc;

/// Run the inference server until SIGINT or SIGTERM.
///
/// The model is loaded on the first `init` request, not at startup.
pub async fn run_daemon(
    config: Config,
    socket_path: Option<PathBuf>,
    framing: Option<Framing>,
    quiet: bool,
) -> Result<()> {
    let socket_path = socket_path.unwrap_or_else(|| config.backend.socket.clone());
    let framing = framing.unwrap_or(config.backend.framing);

    let loader = Arc::new(ConfigLoader::new(config.backend.clone()));
    let handler = InferenceRequestHandler::new(loader, GenerationOptions::from(&config.backend));

    let server = Arc::new(IpcServer::new(socket_path, framing)?);

    if !quiet {
        eprintln!(
            "Inference server listening at: {} ({} framing, {:?} backend)",
            server.socket_path().display(),
            framing,
            config.backend.kind
        );
    }
    tracing::info!(socket = %server.socket_path().display(), %framing, "Server started");

    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nReceived SIGINT, shutting down...");
            }
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                eprintln!("Error setting up signal handler: {}", e);
            }
            if !quiet {
                eprintln!("\nReceived SIGTERM, shutting down...");
            }
        }
    }

    server.stop().await?;

    match server_handle.await {
        Ok(Err(e)) => eprintln!("drishti: server stopped with error: {e}"),
        Err(e) => eprintln!("drishti: server task failed: {e}"),
        Ok(Ok(())) => {}
    }

    if !quiet {
        eprintln!("Server stopped.");
    }
    Ok(())
}

/// Wait for SIGTERM (sent by service managers).
#[cfg(unix)]
pub(crate) async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| DrishtiError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
