//! Simulator facade
//!
//! Owns the shared store, node registry, simulation engine and sync loop, and
//! keeps device membership consistent between the store and the tree.

use crate::config::SimulatorConfig;
use crate::device::Device;
use crate::error::{Result, SimError};
use crate::exposure::{Exposure, LocalExposure};
use crate::registry::NodeRegistry;
use crate::simulation::SimulationEngine;
use crate::store::DeviceStore;
use crate::sync::SyncLoop;
use std::sync::Arc;

/// The simulated machine floor
pub struct Simulator {
    config: SimulatorConfig,
    store: Arc<DeviceStore>,
    registry: Arc<NodeRegistry>,
    engine: Arc<SimulationEngine>,
    sync: Arc<SyncLoop>,
}

impl Simulator {
    /// Create a simulator served by the in-process exposure
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_exposure(config, Arc::new(LocalExposure::new()))
    }

    /// Create a simulator with a custom exposure layer
    pub fn with_exposure(config: SimulatorConfig, exposure: Arc<dyn Exposure>) -> Self {
        let store = Arc::new(DeviceStore::new());
        let registry = Arc::new(NodeRegistry::new(
            store.clone(),
            exposure,
            config.update_capacity,
        ));
        let engine = Arc::new(SimulationEngine::new(store.clone(), &config));
        let sync = Arc::new(SyncLoop::new(
            store.clone(),
            registry.clone(),
            config.sync_interval(),
        ));

        Self {
            config,
            store,
            registry,
            engine,
            sync,
        }
    }

    /// Bring the node tree online with whatever devices already exist
    pub async fn start(&self) -> Result<usize> {
        self.registry.rebuild().await
    }

    /// Take the node tree offline
    pub async fn stop(&self) -> Result<()> {
        self.registry.shutdown().await
    }

    /// Add a device and expose its subtree
    pub async fn add_device(&self, name: impl Into<String>) -> Result<Arc<Device>> {
        let device = self.store.insert(name)?;
        match self.registry.register(&device).await {
            // A concurrent rebuild already picked the device up from the store
            Ok(()) | Err(SimError::DuplicateDevice(_)) => {}
            Err(err) => {
                // Keep store and tree membership identical
                if let Err(rollback) = self.store.remove(device.name()) {
                    tracing::warn!(
                        device = device.name(),
                        error = %rollback,
                        "add rollback failed"
                    );
                }
                return Err(err);
            }
        }
        tracing::info!(device = device.name(), "device added");
        Ok(device)
    }

    /// Add a device under the next generated `Device N` name
    pub async fn add_next_device(&self) -> Result<Arc<Device>> {
        let name = self.store.next_name();
        self.add_device(name).await
    }

    /// Drop the device, then withdraw its subtree
    ///
    /// The device leaves the store first, so no rebuild can remount it.
    pub async fn remove_device(&self, name: &str) -> Result<Arc<Device>> {
        let device = self.store.remove(name)?;
        match self.registry.unregister(name).await {
            // Already gone after a failed or concurrent rebuild
            Ok(()) | Err(SimError::NodesMissing(_)) => {}
            Err(err) => {
                if let Err(restore) = self.store.restore(device) {
                    tracing::warn!(device = name, error = %restore, "remove rollback failed");
                }
                return Err(err);
            }
        }
        tracing::info!(device = name, "device removed");
        Ok(device)
    }

    /// Full teardown and recreation of the node tree
    pub async fn rebuild(&self) -> Result<usize> {
        self.registry.rebuild().await
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<SimulationEngine> {
        &self.engine
    }

    pub fn sync(&self) -> &Arc<SyncLoop> {
        &self.sync
    }
}
