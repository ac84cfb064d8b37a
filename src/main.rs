//! Main entry point for the confab service
//!
//! Wires the session store, dispatch queue, and matchmaking engine
//! together behind a console transport, serves health/metrics endpoints,
//! and drives the engine from stdin for local operation. A real platform
//! adapter replaces the console pieces by feeding the same engine
//! boundary.

use anyhow::Result;
use clap::Parser;
use confab::config::AppConfig;
use confab::engine::{Command, Matchmaker};
use confab::gateway::ConsoleMessenger;
use confab::service::AppState;
use confab::types::InboundMessage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// Confab - anonymous pairing chat relay
#[derive(Parser)]
#[command(
    name = "confab",
    version,
    about = "Anonymous pairing chat relay with topic matchmaking",
    long_about = "Confab pairs anonymous users for one-on-one or lobby chat. \
                 Topic invitations are matched first-claim-wins, outbound \
                 traffic flows through a priority-ordered rate-limited \
                 dispatch queue, and permanently unreachable users are torn \
                 down automatically."
)]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override health/metrics port
    #[arg(long, value_name = "PORT")]
    health_port: Option<u16>,

    /// Enable debug mode (verbose logging, open-hours gate disabled)
    #[arg(short, long)]
    debug: bool,

    /// Validate configuration and exit without starting the service
    #[arg(long)]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Load and merge configuration from file/environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
        config.pairing.debug_mode = true;
    }
    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }

    Ok(config)
}

fn display_startup_banner(config: &AppConfig) {
    info!("Confab pairing chat relay v{}", confab::VERSION);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Health endpoint: {}:{}",
        config.service.health_host, config.service.health_port
    );
    info!("   Pacing: {}ms", config.dispatch.pacing_interval_ms);
    info!(
        "   Open hours: {:02}:00-{:02}:00 (debug override: {})",
        config.hours.open_hour, config.hours.close_hour, config.pairing.debug_mode
    );
    info!("   Admins: {}", config.access.admin_ids.len());
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Drive the engine from stdin for local operation. Lines have the form
/// `<user_id> <text>`; text starting with `/` is a command, `!click <topic>`
/// emulates a discovery tap, `!edit` an edited message.
async fn console_loop(engine: Arc<Matchmaker>) {
    let message_ids = AtomicI64::new(0);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("Console ready; lines are `<user_id> <text>`");
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Console read failed: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((id_part, text)) = line.split_once(char::is_whitespace) else {
            warn!("Ignoring console line without text: {line}");
            continue;
        };
        let Ok(user) = id_part.parse::<i64>() else {
            warn!("Ignoring console line without a numeric user id: {line}");
            continue;
        };
        let text = text.trim();

        if let Some(token) = text.strip_prefix("!click ") {
            engine.handle_discovery_click(user, token).await;
        } else if text == "!edit" {
            engine.handle_edited_message(user).await;
        } else if let Some(command) = Command::parse(text) {
            engine.handle_command(user, command).await;
        } else {
            let message_id = message_ids.fetch_add(1, Ordering::Relaxed) + 1;
            engine
                .handle_free_text(user, InboundMessage::text(message_id, text))
                .await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if args.dry_run {
        display_startup_banner(&config);
        info!("Configuration validation successful; dry run complete");
        return Ok(());
    }

    display_startup_banner(&config);

    let messenger = Arc::new(ConsoleMessenger::new());
    let app_state = match AppState::new(config.clone(), messenger) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start() {
        error!("Failed to start service: {e:#}");
        std::process::exit(1);
    }

    let console_task = {
        let engine = app_state.engine();
        tokio::spawn(async move {
            console_loop(engine).await;
        })
    };

    info!("Confab is running; press Ctrl+C to shut down");
    wait_for_shutdown_signal().await;

    info!("Beginning graceful shutdown...");
    console_task.abort();

    let shutdown = app_state.shutdown();
    match tokio::time::timeout(config.shutdown_timeout(), shutdown).await {
        Ok(()) => info!("Graceful shutdown complete"),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    Ok(())
}
