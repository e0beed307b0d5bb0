//! unifi-sync-agent
//!
//! Mirrors current state from a UniFi network controller into an observable
//! variable sink and tracks device presence from controller-reported
//! last-seen timestamps. One actuator: the guest-network switch.

mod config;
mod error;
mod guest;
mod metrics;
mod presence;
mod sink;
mod sync;
mod unifi;

use std::sync::Arc;

use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::sink::{MemorySink, VariableSink, GUEST_PORTAL_IDENT, ROOT_SCOPE};
use crate::sync::SyncScheduler;
use crate::unifi::{ConnectionState, UnifiClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unifi_sync_agent=info".into()),
        )
        .init();

    tracing::info!("Starting unifi-sync-agent...");

    let config = config::Config::load()?;
    if !config.is_configured() {
        tracing::warn!("Controller credentials not configured yet; cycles will be skipped");
    }

    let status = Arc::new(ConnectionState::new());
    let client = Arc::new(UnifiClient::new(status.clone())?);
    let sink = MemorySink::new();

    // The guest switch exists before the first sync so the actuator has a target
    sink.upsert_value(
        ROOT_SCOPE,
        "WiFi: Guests",
        json!(false),
        99,
        Some(GUEST_PORTAL_IDENT),
    )
    .await;

    let scheduler = Arc::new(SyncScheduler::new(client, sink, status));

    start_background_tasks(scheduler);
    tracing::info!("Background tasks started");

    // The agent is driven entirely by its timers
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}

/// Start the two independent sync loops
fn start_background_tasks(scheduler: Arc<SyncScheduler>) {
    let data_scheduler = scheduler.clone();
    tokio::spawn(async move {
        data_scheduler.start_data_loop().await;
    });

    tokio::spawn(async move {
        scheduler.start_presence_loop().await;
    });
}
