//! Command-line interface for drishti
//!
//! Provides argument parsing using clap derive macros.

use crate::config::BackendKind;
use crate::ipc::framing::Framing;
use crate::pipeline::Mode;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Camera-to-speech scene description
#[derive(Parser, Debug)]
#[command(
    name = "drishti",
    version,
    about = "Camera-to-speech scene description for blind and low-vision users"
)]
pub struct Cli {
    /// Subcommand to execute (default: run the assistant)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose diagnostics (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options of the interactive assistant.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Camera device index
    #[arg(long, value_name = "INDEX")]
    pub camera: Option<u32>,

    /// Describe this image file instead of opening a camera
    #[arg(long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Inference backend (remote, completion, moondream, mock)
    #[arg(long, value_name = "KIND", value_parser = parse_backend_kind)]
    pub backend: Option<BackendKind>,

    /// Inference server socket
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Speak English only
    #[arg(long)]
    pub no_translate: bool,

    /// Do not read trigger keys from stdin
    #[arg(long)]
    pub no_keys: bool,

    /// Do not open the control socket
    #[arg(long)]
    pub no_control: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the assistant (the default)
    Run {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Run the inference server (keeps the model loaded)
    Serve {
        /// Path to Unix socket (default: backend.socket)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Message framing (length-prefixed or legacy)
        #[arg(long, value_name = "FRAMING", value_parser = parse_framing)]
        framing: Option<Framing>,

        /// Backend that answers requests (moondream, completion, mock)
        #[arg(long, value_name = "KIND", value_parser = parse_backend_kind)]
        backend: Option<BackendKind>,
    },

    /// Send a trigger to a running assistant
    Trigger {
        /// describe-once, describe-trilingual, read-text, identify-currency or quit
        mode: Mode,

        /// Control socket (default: $XDG_RUNTIME_DIR/drishti.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Show what a running assistant is doing
    Status {
        /// Control socket (default: $XDG_RUNTIME_DIR/drishti.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Ask an inference server about one image
    Infer {
        /// Image file
        image: PathBuf,

        /// Question to ask
        #[arg(long, short = 'p', value_name = "TEXT")]
        prompt: Option<String>,

        /// Path to Unix socket (default: backend.socket)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Message framing (length-prefixed or legacy)
        #[arg(long, value_name = "FRAMING", value_parser = parse_framing)]
        framing: Option<Framing>,

        /// Give up after this long. Examples: 30s, 2m
        #[arg(long, short = 't', value_name = "DURATION", value_parser = parse_timeout)]
        timeout: Option<Duration>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Parse a timeout with `humantime`; a bare number is seconds.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_framing(s: &str) -> Result<Framing, String> {
    match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "length-prefixed" | "length" | "prefixed" => Ok(Framing::LengthPrefixed),
        "legacy" | "raw" => Ok(Framing::Legacy),
        other => Err(format!(
            "unknown framing '{}' (expected length-prefixed or legacy)",
            other
        )),
    }
}

fn parse_backend_kind(s: &str) -> Result<BackendKind, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "remote" => Ok(BackendKind::Remote),
        "completion" | "http" => Ok(BackendKind::Completion),
        "moondream" => Ok(BackendKind::Moondream),
        "mock" => Ok(BackendKind::Mock),
        other => Err(format!(
            "unknown backend '{}' (expected remote, completion, moondream or mock)",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["drishti"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.run.camera.is_none());
        assert!(cli.run.backend.is_none());
        assert!(!cli.run.no_keys);
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["drishti", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_run_options_at_top_level() {
        let cli = Cli::try_parse_from([
            "drishti",
            "--image",
            "scene.jpg",
            "--backend",
            "mock",
            "--no-translate",
            "--no-control",
        ])
        .unwrap();
        assert_eq!(cli.run.image, Some(PathBuf::from("scene.jpg")));
        assert_eq!(cli.run.backend, Some(BackendKind::Mock));
        assert!(cli.run.no_translate);
        assert!(cli.run.no_control);
    }

    #[test]
    fn test_parse_run_subcommand() {
        let cli = Cli::try_parse_from(["drishti", "run", "--camera", "2", "--no-keys"]).unwrap();
        match cli.command {
            Some(Commands::Run { args }) => {
                assert_eq!(args.camera, Some(2));
                assert!(args.no_keys);
            }
            other => panic!("Expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from([
            "drishti",
            "serve",
            "--socket",
            "/tmp/vision.sock",
            "--framing",
            "legacy",
            "--backend",
            "moondream",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Serve {
                socket,
                framing,
                backend,
            }) => {
                assert_eq!(socket, Some(PathBuf::from("/tmp/vision.sock")));
                assert_eq!(framing, Some(Framing::Legacy));
                assert_eq!(backend, Some(BackendKind::Moondream));
            }
            other => panic!("Expected Serve, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_trigger_mode() {
        let cli = Cli::try_parse_from(["drishti", "trigger", "read-text"]).unwrap();
        match cli.command {
            Some(Commands::Trigger { mode, socket }) => {
                assert_eq!(mode, Mode::ReadText);
                assert!(socket.is_none());
            }
            other => panic!("Expected Trigger, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_trigger_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["drishti", "trigger", "dance"]).is_err());
    }

    #[test]
    fn test_parse_infer_with_timeout() {
        let cli = Cli::try_parse_from([
            "drishti", "infer", "note.jpg", "-p", "What is this?", "-t", "2m",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Infer {
                image,
                prompt,
                timeout,
                ..
            }) => {
                assert_eq!(image, PathBuf::from("note.jpg"));
                assert_eq!(prompt.as_deref(), Some("What is this?"));
                assert_eq!(timeout, Some(Duration::from_secs(120)));
            }
            other => panic!("Expected Infer, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["drishti", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Path
            })
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["drishti", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        ));
    }

    #[test]
    fn test_parse_timeout_values() {
        assert_eq!(parse_timeout("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_timeout("1m30s"), Ok(Duration::from_secs(90)));
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_parse_framing_spellings() {
        assert_eq!(parse_framing("length_prefixed"), Ok(Framing::LengthPrefixed));
        assert_eq!(parse_framing("LEGACY"), Ok(Framing::Legacy));
        assert!(parse_framing("udp").is_err());
    }
}
