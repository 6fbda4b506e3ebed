use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use yarl::config::YarlConfig;
use yarl::http::{HttpServer, RateLimitState};
use yarl::ratelimit::RateLimiter;
use yarl::store;

/// Fixed-window rate limited HTTP service.
#[derive(Debug, Parser)]
#[command(name = "yarl", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    match args.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    info!("Starting Yarl rate limiting service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = YarlConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.http_addr = bind;
    }
    info!(
        http_addr = %config.server.http_addr,
        backend = ?config.rate_limiting.backend.kind,
        "Configuration loaded"
    );

    let policy = config.rate_limiting.policy()?;
    let backend = store::connect(&config.rate_limiting.backend).await?;
    let rate_limiter = Arc::new(RateLimiter::from_policy(policy, backend));
    info!(
        limit = rate_limiter.policy().limit(),
        window = %rate_limiter.policy().window(),
        "Rate limiter initialized"
    );

    let state = RateLimitState::new(rate_limiter, config.rate_limiting.key.clone());
    let http_server = HttpServer::new(config.server.http_addr, state);

    // Run the server with graceful shutdown on Ctrl+C
    http_server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Yarl rate limiting service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
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
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
