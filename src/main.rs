use clap::{Parser, Subcommand};
use mmis::app;
use mmis::storage::settings::load_config;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Multi-model inference server
#[derive(Parser, Debug)]
#[command(name = "mmis")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "MMIS_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `mmis=debug,tower_http=info`
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Model server (lifecycle, inference and job endpoints)
    Serve,
    /// Transfer sidecar installing models from the object store
    Sidecar,
    /// Scoring worker processing async jobs
    Worker,
}

#[tokio::main]
async fn main() -> app::AppResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let config = load_config(cli.config.as_deref())?;
    info!(command = ?cli.command, version = env!("CARGO_PKG_VERSION"), "Starting mmis");

    match cli.command {
        Command::Serve => app::serve(config, shutdown_signal()).await,
        Command::Sidecar => app::run_sidecar(config, shutdown_channel()).await,
        Command::Worker => app::run_worker(config, shutdown_channel()).await,
    }
}

/// `--log-level`, then `RUST_LOG`, then `LOG_LEVEL`, then `info`
fn init_tracing(cli_level: Option<&str>) -> app::AppResult<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level)?,
        None if std::env::var_os("RUST_LOG").is_some() => EnvFilter::try_from_default_env()?,
        None => match std::env::var("LOG_LEVEL") {
            Ok(level) => EnvFilter::try_new(level.to_lowercase())?,
            Err(_) => EnvFilter::new("info"),
        },
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Flips to true once a shutdown signal arrives
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });
    rx
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
