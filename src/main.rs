//! ==============================================================================
//! main.rs - mailbox monitor entry point
//! ==============================================================================
//!
//! purpose:
//!     receives uplinks from the lorawan network server for one or more smart
//!     mailbox units, keeps a live dashboard of the latest state and emails
//!     (via the configured notifier) when mail arrives or the box is tampered
//!     with, without spamming the same alert every uplink.
//!
//! responsibilities:
//!     - load configuration (mailbox.toml + .env / environment)
//!     - build the device directory, decoder, dashboard store and alert gate
//!     - serve the webhook + dashboard
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                      rust server (this crate)                 │
//!     │                                                               │
//!     │   POST / ──► decoder ──► ┌──────── RwLock<Monitor> ───────┐   │
//!     │                          │ dashboard store │ alert gate   │   │
//!     │   GET /  ◄── snapshot ◄──└─────────────────┴──────┬───────┘   │
//!     │                                                   │ approved  │
//!     │                                                   ▼           │
//!     │                                              notifier         │
//!     └──────────────────────────────────────────────────────────────┘
//!
//! state is in memory only; a restart starts from "Waiting for data...".
//!
//! ==============================================================================

mod alerts;
mod config;
mod dashboard;
mod decoder;
mod directory;
mod domain;
mod logging;
mod notifier;
mod pipeline;
mod server;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let log_handle = logging::init();

    info!("===========================================================");
    info!("  Smart Mailbox Monitor");
    info!("===========================================================");

    // step 1: load configuration
    if let Ok(path) = dotenvy::dotenv() {
        info!("[CONFIG] Loaded environment from {}", path.display());
    }
    let mut config = match config::MonitorConfig::load_or_default() {
        Ok(config) => config,
        Err(e) => {
            error!("[ERROR] Fatal: failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    config.apply_env_overrides();
    let cooldown = match config.validate().and_then(|_| config.cooldown()) {
        Ok(cooldown) => cooldown,
        Err(e) => {
            error!("[ERROR] Fatal: invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    log_handle.apply_config_level(&config.logging.level);
    config.print_summary();
    if config.auth.token.is_none() {
        warn!("[CONFIG] No auth token configured - every uplink will be rejected");
    }

    // step 2: build the core
    let directory = Arc::new(directory::DeviceDirectory::from_config(&config.devices));
    info!("[STARTUP] ✓ {} device(s) in directory", directory.len());

    let monitor = pipeline::Monitor {
        dashboard: dashboard::DashboardStore::new(config.dashboard.history_capacity),
        gate: alerts::AlertGate::new(
            cooldown,
            config.dashboard.public_url.clone(),
            config.alerts.low_battery_percent,
        ),
    };
    let notifier = notifier::from_config(&config.notifier)?;
    let pipeline = pipeline::Pipeline::new(
        decoder::Decoder::new(config.decoder.revision),
        directory,
        monitor,
        notifier,
    );

    // step 3: serve
    let state = server::AppState {
        pipeline,
        auth_token: config.auth.token.as_deref().map(Arc::from),
    };
    if let Err(e) = server::run_server(state, &config.server.bind, config.server.port).await {
        error!("[ERROR] Web server error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
