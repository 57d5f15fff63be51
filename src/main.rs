//! Social Gateway
//!
//! HTTP edge gateway in front of the Users and Posts services.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                   GATEWAY                        │
//!                        │                                                  │
//!   Client Request       │  ┌──────────┐   ┌───────────┐   ┌────────────┐  │
//!   ─────────────────────┼─▶│  root    │──▶│  route    │──▶│  handler   │  │
//!                        │  │  layers  │   │  chain    │   │ (dispatch) │  │
//!                        │  └──────────┘   └─────┬─────┘   └─────┬──────┘  │
//!                        │                       │               │         │
//!                        │              auth / rate limit        │ gRPC    │
//!                        │                       ▼               ▼         │
//!                        │                 ┌──────────┐   ┌────────────┐   │
//!                        │                 │  cache   │   │ downstream │───┼──▶ Users / Posts
//!                        │                 │  client  │   │  registry  │   │
//!                        │                 └────┬─────┘   └────────────┘   │
//!                        │                      │                          │
//!                        └──────────────────────┼──────────────────────────┘
//!                                               ▼
//!                                             Redis
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use social_gateway::config::{self, ProcessEnv};
use social_gateway::lifecycle::{handle_signals, Supervisor};
use social_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "social-gateway")]
#[command(about = "HTTP edge gateway for the social platform", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref(), &ProcessEnv) {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from the file we failed to load.
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!("social-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        cache_address = %config.cache.address,
        request_timeout_ms = config.timeouts.request_ms,
        database_url = redacted(config.passthrough.database_url.as_deref()),
        migrate_path = redacted(config.passthrough.migrate_path.as_deref()),
        "Configuration loaded"
    );

    let mut supervisor = Supervisor::new(config.clone());
    if config.observability.metrics_enabled {
        if let Some(handle) = metrics::init_metrics() {
            supervisor = supervisor.with_metrics(handle);
        }
    }

    let shutdown = supervisor.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = handle_signals(shutdown).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });

    match supervisor.run().await {
        Ok(outcome) => {
            tracing::info!(outcome = ?outcome, "Shutdown complete");
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::from(1)
        }
    }
}

fn redacted(value: Option<&str>) -> &'static str {
    match value {
        Some(_) => "<set>",
        None => "<unset>",
    }
}
