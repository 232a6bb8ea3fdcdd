//! nmdc-hubd - a Direct Connect (NMDC) hub.
//!
//! One task owns all hub state and serves every client through a single
//! event loop; socket I/O runs in small reactor tasks around it.

mod admin;
mod cache;
mod config;
mod error;
mod events;
mod handlers;
mod http;
mod metrics;
mod network;
mod persistence;
mod security;
mod state;
mod telemetry;

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::handlers::NmdcProtocol;
use crate::network::{EVENT_QUEUE, EventLoop, Gateway};
use crate::state::Hub;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "hub.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).map_err(|e| {
            error!(path = %config_path, error = %e, "Failed to load config");
            e
        })?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        Config::default()
    };

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s), refusing to start", errors.len());
    }

    info!(
        hub = %config.hub.name,
        address = %config.hub.address,
        max_users = config.hub.max_users,
        "Starting nmdc-hubd"
    );

    metrics::init();
    if config.server.metrics_port != 0 {
        tokio::spawn(http::run_http_server(config.server.metrics_port));
    }

    let address = config.hub.address;
    let mut hub = Hub::new(config);
    for e in hub.load() {
        warn!(error = %e, "Failed to load saved state");
    }

    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let gateway = Gateway::bind(address, tx.clone()).await?;
    tokio::spawn(async move {
        if let Err(e) = gateway.run().await {
            error!(error = %e, "Gateway failed");
        }
    });

    EventLoop::new(hub, NmdcProtocol::new(), rx, tx).run().await
}
