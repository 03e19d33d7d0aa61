//! Runs a small simulated production line until Ctrl-C
//!
//! `IIOTSIM_DEVICES` sets how many machines are created (default 3).
//! Log verbosity follows `RUST_LOG`.

use anyhow::{Context, Result};
use iiotsim_core::{Simulator, SimulatorConfig};
use iiotsim_supervisor::Supervisor;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let device_count: usize = match std::env::var("IIOTSIM_DEVICES") {
        Ok(raw) => raw.parse().context("IIOTSIM_DEVICES must be a number")?,
        Err(_) => 3,
    };

    let simulator = Arc::new(Simulator::new(SimulatorConfig::default()));
    let supervisor = Supervisor::start(simulator.clone()).await?;

    for step in 0..device_count {
        let device = simulator.add_next_device().await?;
        simulator.store().start_production(device.name())?;
        for _ in 0..=step {
            simulator.store().increase_rate(device.name())?;
        }
    }

    let mut updates = simulator.registry().subscribe();
    let mut report = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => {
                if let Ok(update) = update {
                    tracing::debug!(node = %update.key, value = %update.sample.value, "published");
                }
            }
            _ = report.tick() => {
                for device in simulator.store().snapshot() {
                    println!("{}", serde_json::to_string(&device.snapshot())?);
                }
            }
        }
    }

    tracing::info!("shutting down");
    supervisor
        .shutdown_timeout(Duration::from_secs(5))
        .await
        .context("supervisor shutdown")?;
    Ok(())
}
