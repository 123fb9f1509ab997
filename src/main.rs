#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # doorlink
//!
//! Hands out short-lived, single-use links that open a door. A link carries a
//! token signed with HMAC-SHA256 over `{target}:{issued_at}`; redeeming it
//! within five minutes switches the target's relay on through the cloud API,
//! after which the same token is refused.
//!
//! ## Subcommands
//!
//! - `doorlink serve` (default): run the HTTP server
//! - `doorlink targets`: print the resolved target table and exit
//!
//! ## API surface
//!
//! | Method | Path                                   | Auth     | Description                      |
//! |--------|----------------------------------------|----------|----------------------------------|
//! | GET    | `/health`                              | No       | Upstream config and uptime       |
//! | GET    | `/api/targets`                         | No       | Configured targets               |
//! | GET    | `/gen/{target}`                        | No       | Mint a token + redeem URL        |
//! | GET    | `/t/{target}`                          | No       | Mint a token, 302 to redeem path |
//! | GET    | `/open/{target}/{issued_at}/{sig}`     | Token    | Redeem: verify, consume, actuate |
//! | POST   | `/api/operator/open?target=KEY`        | Operator | Actuate without a token          |
//! | GET    | `/api/operator/diag/{target}`          | Operator | Actuate and echo upstream result |
//! | GET    | `/api/operator/activity`               | Operator | Recent actuation attempts        |
//!
//! Operator routes exist only when `[operator] api_key` (or
//! `DOORLINK_OPERATOR_KEY`) is set.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use doorlink::clock::SystemClock;
use doorlink::config::{Config, DEFAULT_SECRET};
use doorlink::{ActuationClient, AppState, CapabilityService, TargetRegistry, TokenCodec};

/// Single-use signed links for cloud-controlled door relays.
#[derive(Parser)]
#[command(name = "doorlink", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve,
    /// Print the resolved target table and exit.
    Targets,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("doorlink: {e}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Targets) => print_targets(&config),
        Some(Commands::Serve) | None => run_server(config).await,
    }
}

fn print_targets(config: &Config) {
    for t in config.resolved_targets() {
        println!("{:<34} {:<14} {}", t.key, t.device_id, t.name);
    }
}

async fn run_server(config: Config) {
    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("doorlink v{} starting", env!("CARGO_PKG_VERSION"));

    if config.token.secret == DEFAULT_SECRET {
        warn!("Using default token secret; set DOORLINK_TOKEN_SECRET or update config");
    }
    if config.upstream.credential().is_none() {
        warn!("No upstream API key configured; every actuation will fail with missing_credential");
    }
    if config.operator_key().is_some() {
        info!("Operator diagnostics enabled");
    }

    let registry = match TargetRegistry::new(config.resolved_targets()) {
        Ok(r) => r,
        Err(e) => {
            error!("Invalid target table: {e}");
            std::process::exit(1);
        }
    };
    info!("{} targets configured, TZ={}", registry.len(), config.server.timezone);

    let actuator = match ActuationClient::new(&config.upstream) {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to build upstream HTTP client: {e}");
            std::process::exit(1);
        }
    };
    info!("Upstream: {}", actuator.base_url());

    let capabilities = CapabilityService::new(
        Arc::new(registry),
        TokenCodec::new(config.token.secret.as_bytes()),
        actuator,
        Arc::new(SystemClock),
    );
    let sweep_interval = config.token.sweep_interval_secs.max(1);
    let listen = config.server.listen.clone();
    let state = AppState::new(config, capabilities);
    let app = doorlink::routes::router(state.clone());

    let listener = match TcpListener::bind(&listen).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {listen}: {e}");
            std::process::exit(1);
        }
    };
    info!("Listening on {listen}");

    // Periodic sweep: drop replay records whose window has passed
    let caps = Arc::clone(&state.capabilities);
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(sweep_interval));
        loop {
            interval.tick().await;
            let removed = caps.sweep().await;
            if removed > 0 {
                debug!(removed, "replay records swept");
            }
        }
    });

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("Received SIGINT"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                    info!("Received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {e}");
    }

    info!("Shutting down...");
    sweep_task.abort();
    info!("Goodbye");
}
