//! Main entry point for the Ready Room matchmaking service
//!
//! Initializes configuration, logging, and the application state, then runs
//! the HTTP API until a shutdown signal arrives.

use anyhow::Result;
use clap::Parser;
use ready_room::api::{ApiServer, ApiServerConfig};
use ready_room::config::AppConfig;
use ready_room::service::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Ready Room Matchmaking Service - queue, match-launch, and start tokens
#[derive(Parser)]
#[command(
    name = "ready-room",
    version,
    about = "A matchmaking and match-launch microservice with signed start tokens",
    long_about = "Ready Room batches players into match groups over HTTP, waits a short \
                 grace window for a late joiner, allocates a dedicated game server per \
                 group, and issues signed time-bounded start tokens the server presents \
                 back for verification."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Token secret override
    #[arg(
        long,
        value_name = "SECRET",
        help = "Override the start-token signing secret"
    )]
    token_secret: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
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
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
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

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Ready Room Matchmaking Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   HTTP: {}:{}",
        config.service.bind_address, config.service.http_port
    );
    info!(
        "   Group size: {}..{} players, grace window {}s",
        config.matchmaking.min_players,
        config.matchmaking.max_players,
        config.matchmaking.wait_for_fourth_seconds
    );
    info!("   Token TTL: {}s", config.token.ttl_seconds);
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    if let Some(token_secret) = &args.token_secret {
        config.token.secret = token_secret.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config);

    if args.dry_run {
        info!("Configuration validation successful");
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let api_server = Arc::new(ApiServer::new(
        ApiServerConfig {
            host: config.service.bind_address.clone(),
            port: config.service.http_port,
        },
        Arc::clone(&app_state),
    ));

    let server_task = {
        let api_server = Arc::clone(&api_server);
        tokio::spawn(async move {
            if let Err(e) = api_server.start().await {
                error!("API server failed: {}", e);
            }
        })
    };

    info!("Ready Room Matchmaking Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    app_state.stop();
    api_server.stop();

    match tokio::time::timeout(config.shutdown_timeout(), server_task).await {
        Ok(_) => {
            info!("Graceful shutdown completed successfully");
        }
        Err(_) => {
            warn!("Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("Ready Room Matchmaking Service stopped");
    Ok(())
}
