use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use drishti::app::{RunOptions, infer_once, run_assistant};
use drishti::cli::{Cli, Commands, ConfigAction, RunArgs};
use drishti::config::Config;
use drishti::daemon::run_daemon;
use drishti::defaults::DESCRIBE_PROMPT;
use drishti::ipc::control::{
    ControlCommand, ControlResponse, default_control_socket_path, send_control_command,
};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            run(config, cli.run, cli.quiet).await?;
        }
        Some(Commands::Run { args }) => {
            let config = load_config(cli.config.as_deref())?;
            run(config, args, cli.quiet).await?;
        }
        Some(Commands::Serve {
            socket,
            framing,
            backend,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(kind) = backend {
                config.backend.kind = kind;
            }
            run_daemon(config, socket, framing, cli.quiet).await?;
        }
        Some(Commands::Trigger { mode, socket }) => {
            handle_control_command(socket, ControlCommand::Trigger { mode }).await?;
        }
        Some(Commands::Status { socket }) => {
            handle_control_command(socket, ControlCommand::Status).await?;
        }
        Some(Commands::Infer {
            image,
            prompt,
            socket,
            framing,
            timeout,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let prompt = prompt.unwrap_or_else(|| DESCRIBE_PROMPT.to_string());
            match infer_once(&config, &image, &prompt, socket, framing, timeout).await {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("{}", format!("Inference failed: {}", e).red());
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "drishti", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Diagnostics go to stderr. `RUST_LOG` wins over the flags.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("drishti={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    let config = config.with_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(mut config: Config, args: RunArgs, quiet: bool) -> Result<()> {
    if let Some(index) = args.camera {
        config.camera.index = index;
    }
    if let Some(image) = args.image {
        config.camera.still_image = Some(image);
    }
    if let Some(kind) = args.backend {
        config.backend.kind = kind;
    }
    if let Some(socket) = args.socket {
        config.backend.socket = socket;
    }
    if args.no_translate {
        config.output.translate = false;
    }

    let options = RunOptions {
        quiet,
        no_keys: args.no_keys,
        no_control: args.no_control,
    };
    run_assistant(config, options).await?;
    Ok(())
}

async fn handle_control_command(socket: Option<PathBuf>, command: ControlCommand) -> Result<()> {
    let socket = socket.unwrap_or_else(default_control_socket_path);
    match send_control_command(&socket, command).await {
        Ok(ControlResponse::Accepted) => println!("{}", "accepted".green()),
        Ok(ControlResponse::Busy) => println!("{}", "busy (trigger dropped)".yellow()),
        Ok(ControlResponse::Status { state }) => {
            let state = format!("{:?}", state).to_lowercase();
            println!("State: {}", state.green());
        }
        Ok(ControlResponse::Error { message }) => {
            eprintln!("{}", format!("Error: {}", message).red());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to reach assistant at {}: {}", socket.display(), e).red()
            );
            eprintln!("Is 'drishti run' running?");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = custom_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            let marker = if path.exists() {
                "exists".green().to_string()
            } else {
                "not created, using defaults".dimmed().to_string()
            };
            println!("{} ({})", path.display(), marker);
        }
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            let toml = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{}", toml);
        }
    }
    Ok(())
}
