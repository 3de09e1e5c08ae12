//! synclink command line entry point
//!
//! Connects to a realtime backend, prints every connection event as a JSON
//! line on stdout and keeps reconnecting until interrupted.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use synclink::config::ClientConfig;
use synclink::connection::{
    ConnectionActor, ConnectionEvent, ConnectionHandle, ConnectionStatus, TokioScheduler,
};
use synclink::observability::init_default_logging;
use synclink::transport::websocket::WebSocketTransportFactory;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "synclink")]
#[command(about = "Realtime sync connection client")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured application id
    #[arg(long, env = "SYNCLINK_APP_ID")]
    app_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stream connection events until interrupted
    Run {
        /// JSON object sent every time a connection opens
        #[arg(long, value_name = "JSON")]
        init: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting synclink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref(), cli.app_id) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { init } => run_client(config, init).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: Option<&Path>,
    app_id: Option<String>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => ["synclink.toml", "config/synclink.toml"]
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
            .ok_or("No configuration file found. Provide one with -c/--config or create synclink.toml")?,
    };

    info!("Loading configuration from: {}", path.display());
    let mut config = ClientConfig::load_from_file(&path)?;
    if let Some(app_id) = app_id {
        config.connection.app_id = app_id;
        config.validate()?;
    }
    Ok(config)
}

async fn run_client(
    config: ClientConfig,
    init: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let init_payload: Option<Value> = init.as_deref().map(serde_json::from_str).transpose()?;

    let handle = ConnectionActor::spawn_from_config(
        &config,
        Arc::new(WebSocketTransportFactory::new()),
        Arc::new(TokioScheduler::new()),
    )?;
    let mut events = handle.subscribe();
    handle.start()?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!(app_id = %config.connection.app_id, "client running");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            event = events.recv() => match event {
                Some(event) => {
                    print_event(&event)?;
                    send_init_on_open(&handle, &event, init_payload.as_ref());
                }
                None => {
                    warn!("connection actor stopped unexpectedly");
                    break;
                }
            }
        }
    }

    handle.shutdown()?;
    let final_state = handle.snapshot().await;
    info!(generation = final_state.generation, "connection closed");
    Ok(())
}

fn print_event(event: &ConnectionEvent) -> Result<(), serde_json::Error> {
    let line = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "event": event,
    });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

fn send_init_on_open(handle: &ConnectionHandle, event: &ConnectionEvent, init: Option<&Value>) {
    let Some(payload) = init else {
        return;
    };
    if event.status() != Some(ConnectionStatus::Opened) {
        return;
    }
    match handle.send_with_new_id(payload.clone()) {
        Ok(correlation_id) => info!(%correlation_id, "init payload sent"),
        Err(e) => warn!("failed to send init payload: {}", e),
    }
}

fn handle_config_command(
    config: &ClientConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
        println!("# connection URL: {}", config.connection.connection_url()?);
    }

    info!("Configuration validation complete");
    Ok(())
}
