//! Assistant entry point.
//!
//! Wires camera, backend, router, speech, OCR and evidence logging into a
//! [`PipelineController`] and feeds it triggers from the keyboard and the
//! control socket until quit.

use crate::backend::build_backend;
use crate::config::{CameraConfig, Config, OutputConfig};
use crate::error::{DrishtiError, Result};
use crate::evidence::FileEvidenceLogger;
use crate::exec::{CommandExecutor, SystemCommandExecutor};
use crate::frame::{FrameSource, StillImageSource};
use crate::ipc::client::ProtocolClient;
use crate::ipc::control::{
    ControlCommand, ControlHandler, ControlResponse, ControlServer, default_control_socket_path,
};
use crate::ipc::framing::Framing;
use crate::ocr::TesseractOcr;
use crate::output::print_key_help;
use crate::pipeline::{Mode, PipelineContext, PipelineController, spawn_stdin_reader};
use crate::router::OutputRouter;
use crate::speech::Synthesizer;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Knobs for [`run_assistant`] that come from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub quiet: bool,
    /// Do not read keys from stdin (control socket only)
    pub no_keys: bool,
    /// Do not open the control socket
    pub no_control: bool,
}

/// Run the interactive assistant until `q`, EOF on stdin, or a signal.
///
/// Camera and backend failures at startup are fatal; everything after that
/// is recovered per trigger.
pub async fn run_assistant(config: Config, options: RunOptions) -> Result<()> {
    let quiet = options.quiet;
    check_prerequisites(&config, quiet);

    if !quiet {
        eprintln!("Opening camera...");
    }
    let frames = open_frame_source(&config.camera)?;

    if !quiet {
        eprintln!("Connecting to {:?} backend...", config.backend.kind);
    }
    let backend = build_backend(&config.backend).await?;
    tracing::info!(
        version = %crate::version_string(),
        backend = backend.name(),
        frames = frames.name(),
        "Assistant ready"
    );

    let executor: Arc<dyn CommandExecutor> = Arc::new(SystemCommandExecutor);
    let mut context = PipelineContext::new(
        frames,
        backend,
        Synthesizer::from_config(&config.speech, Arc::clone(&executor)),
    )
    .with_router(build_router(&config.output)?)
    .with_describe_languages(config.output.languages.clone())
    .with_announcements(config.speech.announce)
    .with_echo(!quiet);

    if config.evidence.enabled {
        context = context.with_evidence(Arc::new(FileEvidenceLogger::from_config(
            &config.evidence,
        )));
    }
    if config.ocr.enabled {
        context = context.with_ocr(Arc::new(TesseractOcr::from_config(
            &config.ocr,
            Arc::clone(&executor),
        )));
    }

    let controller = Arc::new(PipelineController::new(context));
    let (tx, mut rx) = mpsc::channel::<Mode>(8);

    if !options.no_keys {
        spawn_stdin_reader(tx.clone());
    }

    let control = if options.no_control {
        None
    } else {
        let path = config
            .control
            .socket
            .clone()
            .unwrap_or_else(default_control_socket_path);
        let server = Arc::new(ControlServer::new(path));
        let handler = AssistantControl {
            controller: Arc::clone(&controller),
            triggers: tx.clone(),
        };
        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = server_clone.start(handler).await {
                tracing::error!("Control socket failed: {}", e);
            }
        });
        Some(server)
    };
    drop(tx);

    if !quiet {
        if let Some(server) = &control {
            eprintln!("Control socket: {}", server.socket_path().display());
        }
        if !options.no_keys {
            eprintln!("Keys (type and press Enter):");
            print_key_help();
        }
    }
    controller.greet().await;

    loop {
        tokio::select! {
            mode = rx.recv() => match mode {
                None | Some(Mode::Quit) => break,
                Some(mode) => {
                    let controller = Arc::clone(&controller);
                    tokio::spawn(async move {
                        controller.handle(mode).await;
                    });
                }
            },
            _ = tokio::signal::ctrl_c() => {
                if !quiet {
                    eprintln!("\nReceived SIGINT, shutting down...");
                }
                break;
            }
            res = crate::daemon::wait_for_sigterm() => {
                if let Err(e) = res {
                    eprintln!("Error setting up signal handler: {}", e);
                }
                break;
            }
        }
    }

    if let Some(server) = control {
        server.stop().await?;
    }
    if !quiet {
        eprintln!("Goodbye.");
    }
    Ok(())
}

/// Control socket handler: triggers join the keyboard queue.
struct AssistantControl {
    controller: Arc<PipelineController>,
    triggers: mpsc::Sender<Mode>,
}

#[async_trait]
impl ControlHandler for AssistantControl {
    async fn handle(&self, command: ControlCommand) -> ControlResponse {
        match command {
            ControlCommand::Status => ControlResponse::Status {
                state: self.controller.state(),
            },
            ControlCommand::Trigger { mode } => {
                if mode != Mode::Quit && self.controller.is_busy() {
                    return ControlResponse::Busy;
                }
                match self.triggers.try_send(mode) {
                    Ok(()) => ControlResponse::Accepted,
                    Err(mpsc::error::TrySendError::Full(_)) => ControlResponse::Busy,
                    Err(mpsc::error::TrySendError::Closed(_)) => ControlResponse::Error {
                        message: "assistant is shutting down".to_string(),
                    },
                }
            }
        }
    }
}

/// Open the configured frame source: a still image, or the camera.
pub fn open_frame_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = &config.still_image {
        if !path.exists() {
            return Err(DrishtiError::CameraUnavailable {
                device: path.display().to_string(),
            });
        }
        return Ok(Box::new(StillImageSource::new(path.clone())));
    }
    open_camera(config)
}

#[cfg(feature = "opencv-camera")]
fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(crate::frame::camera::OpenCvCamera::open(config)?))
}

#[cfg(not(feature = "opencv-camera"))]
fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Err(DrishtiError::CameraUnavailable {
        device: format!(
            "{} (built without the 'opencv-camera' feature; set camera.still_image)",
            config.index
        ),
    })
}

/// Router for the configured output languages.
#[cfg(feature = "http")]
pub fn build_router(config: &OutputConfig) -> Result<OutputRouter> {
    if !config.translate {
        return Ok(OutputRouter::untranslated());
    }
    let translator = crate::router::translate::HttpTranslator::new(
        &config.translate_url,
        Duration::from_secs(10),
    )?;
    Ok(OutputRouter::new(Arc::new(translator)))
}

#[cfg(not(feature = "http"))]
pub fn build_router(config: &OutputConfig) -> Result<OutputRouter> {
    if config.translate {
        tracing::warn!("Translation needs the 'http' feature; speaking English only");
    }
    Ok(OutputRouter::untranslated())
}

/// Ask a running inference server about one image file.
///
/// Performs the full `init` → `clear_kv_cache` → `infer` exchange.
pub async fn infer_once(
    config: &Config,
    image: &Path,
    prompt: &str,
    socket: Option<PathBuf>,
    framing: Option<Framing>,
    timeout: Option<Duration>,
) -> Result<String> {
    let image = std::fs::canonicalize(image).map_err(|e| DrishtiError::Other(format!(
        "Cannot read image {}: {}",
        image.display(),
        e
    )))?;
    let client = ProtocolClient::new(
        socket.unwrap_or_else(|| config.backend.socket.clone()),
        framing.unwrap_or(config.backend.framing),
    )
    .with_timeout(timeout.unwrap_or(Duration::from_secs(config.backend.timeout_secs)));

    client.initialize(&config.backend.model_path).await?;
    client.clear_kv_cache().await?;
    client
        .infer(
            &image,
            prompt,
            config.backend.n_predict,
            Some(config.backend.temperature),
        )
        .await
}

/// Warn about missing speech tools. Speech failures are not fatal, so
/// neither is this.
fn check_prerequisites(config: &Config, quiet: bool) {
    let mut tools = vec![config.speech.resident_command.as_str()];
    if config.speech.generate_command != config.speech.resident_command {
        tools.push(config.speech.generate_command.as_str());
    }
    if config.ocr.enabled {
        tools.push(config.ocr.command.as_str());
    }
    for tool in tools {
        if Command::new(tool).arg("--version").output().is_err() {
            tracing::warn!(tool, "Tool not found on PATH");
            if !quiet {
                eprintln!("Warning: '{}' not found; that output will be silent.", tool);
            }
        }
    }
}
