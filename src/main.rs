//! obs-remote console client
//!
//! Connects to OBS over WebSocket, prints the mirrored state as it changes
//! and reads operator commands from stdin.

use anyhow::{bail, Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use obs_remote::console::{self, ConsoleInput};
use obs_remote::transport::ObsWebSocket;
use obs_remote::{Config, OperatorCommand, RenderCommand, Session, Ui};

/// Command-line overrides on top of the config file
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    password: Option<String>,
}

fn main() -> Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let args = parse_args(&raw)?;

    let _log_guard = obs_remote::logging::init_logging()?;
    info!("obs-remote starting...");

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded from {:?}", config.config_path());
    if let Some(host) = args.host {
        config.obs.host = host;
    }
    if let Some(port) = args.port {
        config.obs.port = port;
    }
    if args.password.is_some() {
        config.obs.password = args.password;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(run(config))?;

    info!("Shutdown complete");
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let (ui, mut renders) = Ui::channel();
    let transport = ObsWebSocket::new(config.obs.clone());
    let session = Session::new(transport, config.session.clone(), ui);

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<ConsoleInput>();

    // Ctrl+C goes through the same shutdown path as `quit`
    let ctrl_c_tx = input_tx.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let _ = ctrl_c_tx.send(ConsoleInput::Command(OperatorCommand::Quit));
    })
    .context("Failed to install Ctrl+C handler")?;

    // stdin blocks, so it gets its own thread
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match console::parse_line(&line) {
                Ok(input) => {
                    if input_tx.send(input).is_err() {
                        break;
                    }
                }
                Err(e) => println!("-- {}", e),
            }
        }
        // EOF on stdin quits
        let _ = input_tx.send(ConsoleInput::Command(OperatorCommand::Quit));
    });

    // One consumer, so commands reach the server in the order they were typed
    let (command_tx, command_rx) = mpsc::unbounded_channel::<OperatorCommand>();
    let command_queue = {
        let session = session.clone();
        tokio::spawn(async move { session.run_commands(command_rx).await })
    };

    println!("Connecting to {}, type 'help' for commands", config.obs.address());
    let _ = command_tx.send(OperatorCommand::Connect);

    loop {
        tokio::select! {
            render = renders.recv() => match render {
                Some(RenderCommand::Close) | None => break,
                Some(render) => {
                    if let Some(line) = console::format_render(&render) {
                        println!("{}", line);
                    }
                }
            },
            input = input_rx.recv() => match input {
                // Quit skips the queue so a stuck request cannot hold it up
                Some(ConsoleInput::Command(OperatorCommand::Quit)) => {
                    command_queue.abort();
                    let session = session.clone();
                    tokio::spawn(async move { session.shutdown().await });
                }
                Some(ConsoleInput::Command(command)) => {
                    if command_tx.send(command).is_err() {
                        warn!("Command queue is gone, dropping command");
                    }
                }
                Some(ConsoleInput::Dump) => {
                    let snapshot = session.snapshot().await;
                    match serde_json::to_string_pretty(&snapshot) {
                        Ok(json) => println!("{}", json),
                        Err(e) => error!("Failed to serialize state: {}", e),
                    }
                }
                Some(ConsoleInput::Help) => println!("{}", console::HELP),
                Some(ConsoleInput::Empty) => {}
                None => break,
            },
        }
    }

    Ok(())
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args::default();
    let mut iter = raw.iter();
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .with_context(|| format!("{} needs a value", flag))
        };
        match flag.as_str() {
            "--config" | "-c" => args.config = Some(PathBuf::from(value()?)),
            "--host" => args.host = Some(value()?),
            "--port" => {
                let port = value()?;
                args.port = Some(
                    port.parse()
                        .with_context(|| format!("Invalid port: {}", port))?,
                );
            }
            "--password" => args.password = Some(value()?),
            other => bail!("Unknown argument: {} (see --help)", other),
        }
    }
    Ok(args)
}

fn print_help() {
    println!("obs-remote - Remote control for OBS scenes, sources and audio");
    println!();
    println!("USAGE:");
    println!("    obs-remote [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help              Print this help message");
    println!("    -c, --config <PATH>     Use this config file instead of the default");
    println!("        --host <HOST>       OBS WebSocket host");
    println!("        --port <PORT>       OBS WebSocket port");
    println!("        --password <PASS>   OBS WebSocket password");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                Set log level (e.g., debug, info, warn)");
    println!("    OBS_REMOTE_LOG_PATH     Override the log directory");
    println!();
    println!("{}", console::HELP);
}
