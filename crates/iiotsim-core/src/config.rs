//! Simulator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the simulator runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Period of the simulation loop in milliseconds
    pub simulation_interval_ms: u64,

    /// Period of the sync loop in milliseconds
    pub sync_interval_ms: u64,

    /// Buffered node updates per subscriber before it starts lagging
    pub update_capacity: usize,

    /// Fixed RNG seed for reproducible runs; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            simulation_interval_ms: 200,
            sync_interval_ms: 1000,
            update_capacity: 1024,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn simulation_interval(&self) -> Duration {
        Duration::from_millis(self.simulation_interval_ms.max(1))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    #[must_use]
    pub fn with_simulation_interval(mut self, interval: Duration) -> Self {
        self.simulation_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
