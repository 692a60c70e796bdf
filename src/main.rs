//! request-guard server binary.
//!
//! ```text
//!   Client ──▶ request id ──▶ trace ──▶ timeout ──▶ gateway ──▶ handler
//!                                                    │            │
//!                                         redirect / preflight    origin, CSRF,
//!                                         bearer presence         rate limit,
//!                                         CSRF cookie, headers    signature, identity
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use request_guard::config::loader::{load_config, load_from_env};
use request_guard::http::Collaborators;
use request_guard::lifecycle::{wait_for_signal, Shutdown};
use request_guard::observability::{logging, metrics};
use request_guard::security::identity::{LoggingMailer, StaticTokenVerifier};
use request_guard::security::SystemClock;
use request_guard::HttpServer;

#[derive(Parser)]
#[command(name = "request-guard")]
#[command(about = "Request defense gateway for the website API", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults plus GUARD_* environment overrides when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!("request-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        canonical_origin = %config.site.canonical_origin,
        production = config.site.production,
        rate_limit_enabled = config.rate_limit.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let collaborators = Collaborators::new(
        Arc::new(SystemClock),
        Arc::new(StaticTokenVerifier::from_config(&config.identity)),
        Arc::new(LoggingMailer),
    );

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, collaborators);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
