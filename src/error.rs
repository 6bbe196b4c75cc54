//! Error types for drishti.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrishtiError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Camera errors
    #[error("Camera not available: {device}")]
    CameraUnavailable { device: String },

    #[error("Camera read timed out after {attempts} attempts")]
    CameraReadTimeout { attempts: u32 },

    #[error("Camera capture failed: {message}")]
    CameraCapture { message: String },

    // Inference errors
    #[error("Inference backend failed: {message}")]
    Backend { message: String },

    #[error("Inference timed out after {seconds}s")]
    BackendTimeout { seconds: u64 },

    #[error("Inference model not found at {path}")]
    ModelNotFound { path: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // Output errors
    #[error("Translation to '{target}' failed: {message}")]
    Translation { target: String, message: String },

    #[error("Speech tool not found: {tool}")]
    SpeechToolNotFound { tool: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Text recognition failed: {message}")]
    Ocr { message: String },

    #[error("Evidence logging failed: {message}")]
    EvidenceLog { message: String },

    // External tools
    #[error("Tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    // Encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

/// Coarse error class used to pick the user-facing reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Camera,
    Backend,
    Protocol,
    Translation,
    Synthesis,
    Logging,
    Config,
    Io,
    Other,
}

impl DrishtiError {
    /// Classify the error for recovery and user feedback.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DrishtiError::ConfigFileNotFound { .. }
            | DrishtiError::ConfigParse { .. }
            | DrishtiError::ConfigInvalidValue { .. }
            | DrishtiError::Config(_) => ErrorKind::Config,
            DrishtiError::CameraUnavailable { .. }
            | DrishtiError::CameraReadTimeout { .. }
            | DrishtiError::CameraCapture { .. } => ErrorKind::Camera,
            DrishtiError::Backend { .. }
            | DrishtiError::BackendTimeout { .. }
            | DrishtiError::ModelNotFound { .. }
            | DrishtiError::Ocr { .. } => ErrorKind::Backend,
            DrishtiError::IpcSocket { .. }
            | DrishtiError::IpcProtocol { .. }
            | DrishtiError::IpcConnection { .. } => ErrorKind::Protocol,
            DrishtiError::Translation { .. } => ErrorKind::Translation,
            DrishtiError::SpeechToolNotFound { .. } | DrishtiError::Synthesis { .. } => {
                ErrorKind::Synthesis
            }
            DrishtiError::EvidenceLog { .. } => ErrorKind::Logging,
            DrishtiError::Io(_)
            | DrishtiError::ToolNotFound { .. }
            | DrishtiError::CommandFailed { .. } => ErrorKind::Io,
            DrishtiError::Image(_) | DrishtiError::Json(_) | DrishtiError::Other(_) => {
                ErrorKind::Other
            }
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, DrishtiError>;
