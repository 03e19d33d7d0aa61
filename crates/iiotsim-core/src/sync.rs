//! Change-detecting sync between the store and the node tree

use crate::device::Device;
use crate::error::{Result, SimError};
use crate::node::{Attribute, NodeUpdate};
use crate::registry::{NodeRegistry, NodeTree};
use crate::store::DeviceStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A device skipped during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFault {
    pub device: String,
    pub error: SimError,
}

/// Outcome of one sync tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub devices: usize,
    pub published: usize,
    pub faults: Vec<DeviceFault>,
}

/// Publishes store changes into the node tree on a fixed cadence
pub struct SyncLoop {
    store: Arc<DeviceStore>,
    registry: Arc<NodeRegistry>,
    interval: Duration,
}

impl SyncLoop {
    pub fn new(store: Arc<DeviceStore>, registry: Arc<NodeRegistry>, interval: Duration) -> Self {
        Self {
            store,
            registry,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Diff every device against its published nodes
    ///
    /// Runs under the registry read lock. A device whose nodes cannot be
    /// updated is recorded as a fault and retried next tick.
    pub async fn tick(&self) -> Result<SyncReport> {
        let tree = self.registry.read_tree().await;
        if !tree.is_online() {
            return Err(SimError::TreeOffline);
        }

        let devices = self.store.snapshot();
        let mut report = SyncReport {
            devices: devices.len(),
            ..SyncReport::default()
        };

        for device in &devices {
            match self.sync_device(&tree, device) {
                Ok(published) => report.published += published,
                Err(error) => {
                    tracing::warn!(device = device.name(), %error, "skipping device this tick");
                    report.faults.push(DeviceFault {
                        device: device.name().to_string(),
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    fn sync_device(&self, tree: &NodeTree, device: &Device) -> Result<usize> {
        let nodes = tree
            .device(device.name())
            .ok_or_else(|| SimError::NodesMissing(device.name().to_string()))?;
        let state = device.state();
        let now = Utc::now();

        let mut published = 0;
        for attribute in Attribute::ALL {
            let node = nodes
                .variable(attribute)
                .ok_or_else(|| SimError::NodeNotFound(format!("{}/{attribute}", device.name())))?;
            if let Some(sample) = node.publish_if_changed(state.attribute_value(attribute), now)? {
                self.registry.notify(NodeUpdate {
                    key: node.key().clone(),
                    sample,
                });
                published += 1;
            }
        }
        Ok(published)
    }

    /// Sync on the configured period until cancelled
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "sync loop started");

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            match self.tick().await {
                Ok(report) => {
                    if report.published > 0 || !report.faults.is_empty() {
                        tracing::debug!(
                            devices = report.devices,
                            published = report.published,
                            faults = report.faults.len(),
                            "sync tick"
                        );
                    }
                }
                Err(error) => tracing::warn!(%error, "sync tick skipped"),
            }
        }

        tracing::info!("sync loop stopped");
    }
}
