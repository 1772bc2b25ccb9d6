//! # tollgate — Binary Entry Point
//!
//! Loads configuration, connects session storage, loads API definitions and
//! serves the gateway until interrupted.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tollgate_api::config::GatewayConfig;

/// Tollgate API gateway.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long, env = "TOLLGATE_CONFIG")]
    conf: Option<PathBuf>,

    /// Listen port. Overrides the config file and `TOLLGATE_PORT`.
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut config = GatewayConfig::load(cli.conf.as_deref()).map_err(|e| {
        tracing::error!("configuration failed: {e}");
        e
    })?;
    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    let port = config.listen_port;

    let state = tollgate_api::bootstrap::bootstrap(config)
        .await
        .map_err(|e| {
            tracing::error!("bootstrap failed: {e}");
            e
        })?;

    let app = tollgate_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("tollgate listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("tollgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
