//! Device record store and operator-side device management

use crate::device::{Device, DeviceError, DeviceState, ProductionStatus};
use crate::error::{Result, SimError};
use crate::node::ADDRESS_SEPARATOR;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Step applied by the rate up/down operations
pub const RATE_STEP: i32 = 10;

/// Shared collection of simulated machines, keyed by unique name
#[derive(Debug, Default)]
pub struct DeviceStore {
    devices: DashMap<String, Arc<Device>>,
    created: AtomicU64,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject names that are empty or would break `device/attribute` addressing
    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(SimError::EmptyDeviceName);
        }
        if name.contains(ADDRESS_SEPARATOR) {
            return Err(SimError::ReservedSeparator(name.to_string()));
        }
        Ok(())
    }

    /// Insert a new idle device
    pub fn insert(&self, name: impl Into<String>) -> Result<Arc<Device>> {
        let name = name.into();
        Self::validate_name(&name)?;

        match self.devices.entry(name) {
            Entry::Occupied(entry) => Err(SimError::DuplicateDevice(entry.key().clone())),
            Entry::Vacant(entry) => {
                let device = Arc::new(Device::new(entry.key().clone()));
                entry.insert(device.clone());
                Ok(device)
            }
        }
    }

    /// Put a previously removed device back, state intact
    pub(crate) fn restore(&self, device: Arc<Device>) -> Result<()> {
        match self.devices.entry(device.name().to_string()) {
            Entry::Occupied(entry) => Err(SimError::DuplicateDevice(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(device);
                Ok(())
            }
        }
    }

    /// Reserve the next free generated name, `Device N`
    ///
    /// Each call consumes its ordinal, so concurrent callers never receive
    /// the same name.
    pub fn next_name(&self) -> String {
        loop {
            let ordinal = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            let name = format!("Device {ordinal}");
            if !self.devices.contains_key(&name) {
                return name;
            }
        }
    }

    pub fn remove(&self, name: &str) -> Result<Arc<Device>> {
        self.devices
            .remove(name)
            .map(|(_, device)| device)
            .ok_or_else(|| SimError::DeviceNotFound(name.to_string()))
    }

    /// Resolve exactly one device by name
    pub fn get(&self, name: &str) -> Result<Arc<Device>> {
        self.devices
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SimError::DeviceNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Copy of the current membership, ordered by name
    pub fn snapshot(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<_> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by(|a, b| a.name().cmp(b.name()));
        devices
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|device| device.name().to_string())
            .collect()
    }

    fn update<R>(&self, name: &str, f: impl FnOnce(&mut DeviceState) -> R) -> Result<R> {
        Ok(self.get(name)?.update(f))
    }

    /// Start production under a fresh work order
    pub fn start_production(&self, name: &str) -> Result<Uuid> {
        let workorder = Uuid::new_v4();
        self.update(name, |state| {
            state.production_status = ProductionStatus::Running;
            state.workorder_id = workorder;
        })?;
        tracing::info!(device = name, %workorder, "production started");
        Ok(workorder)
    }

    /// Stop production and close the work order
    pub fn stop_production(&self, name: &str) -> Result<()> {
        self.update(name, |state| {
            state.production_status = ProductionStatus::Stopped;
            state.workorder_id = Uuid::nil();
        })?;
        tracing::info!(device = name, "production stopped");
        Ok(())
    }

    /// Raise the rate one step, never past 100
    pub fn increase_rate(&self, name: &str) -> Result<i32> {
        self.update(name, |state| {
            if state.production_rate < 100 {
                state.production_rate = (state.production_rate + RATE_STEP).min(100);
            }
            state.production_rate
        })
    }

    /// Lower the rate one step when at least one full step remains
    pub fn decrease_rate(&self, name: &str) -> Result<i32> {
        self.update(name, |state| {
            if state.production_rate >= RATE_STEP {
                state.production_rate -= RATE_STEP;
            }
            state.production_rate
        })
    }

    /// Inject or clear a single fault flag
    pub fn set_fault(&self, name: &str, flag: DeviceError, active: bool) -> Result<DeviceError> {
        let errors = self.update(name, |state| {
            state.device_error.set(flag, active);
            state.device_error
        })?;
        tracing::info!(device = name, errors = %errors, "fault flags changed");
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = DeviceStore::new();
        store.insert("M1").unwrap();
        assert_eq!(
            store.insert("M1").unwrap_err(),
            SimError::DuplicateDevice("M1".into())
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_name_validation() {
        let store = DeviceStore::new();
        assert_eq!(store.insert("").unwrap_err(), SimError::EmptyDeviceName);
        assert_eq!(store.insert("   ").unwrap_err(), SimError::EmptyDeviceName);
        assert!(matches!(
            store.insert("line/M1").unwrap_err(),
            SimError::ReservedSeparator(_)
        ));
        // Other punctuation is fine since keys are structured
        store.insert("M1:::productionRate").unwrap();
    }

    #[test]
    fn test_generated_names_skip_taken() {
        let store = DeviceStore::new();
        store.insert("Device 2").unwrap();
        assert_eq!(store.next_name(), "Device 1");
        assert_eq!(store.next_name(), "Device 3");
    }

    #[test]
    fn test_generated_names_are_unique_across_threads() {
        let store = DeviceStore::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..250 {
                        let name = store.next_name();
                        store.insert(name).unwrap();
                    }
                });
            }
        });
        assert_eq!(store.len(), 1000);
        assert!(store.contains("Device 1000"));
    }

    #[test]
    fn test_restore_keeps_state() {
        let store = DeviceStore::new();
        store.insert("M1").unwrap().update(|s| s.good_count = 7);
        let device = store.remove("M1").unwrap();
        store.restore(device.clone()).unwrap();
        assert_eq!(store.get("M1").unwrap().state().good_count, 7);
        assert_eq!(
            store.restore(device).unwrap_err(),
            SimError::DuplicateDevice("M1".into())
        );
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let store = DeviceStore::new();
        store.insert("B").unwrap();
        store.insert("A").unwrap();
        let snapshot = store.snapshot();
        store.insert("C").unwrap();
        assert_eq!(
            snapshot.iter().map(|d| d.name()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(store.names(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_start_and_stop_production() {
        let store = DeviceStore::new();
        store.insert("M1").unwrap();

        let workorder = store.start_production("M1").unwrap();
        let state = store.get("M1").unwrap().state();
        assert_eq!(state.production_status, ProductionStatus::Running);
        assert_eq!(state.workorder_id, workorder);
        assert!(!workorder.is_nil());

        store.stop_production("M1").unwrap();
        let state = store.get("M1").unwrap().state();
        assert_eq!(state.production_status, ProductionStatus::Stopped);
        assert!(state.workorder_id.is_nil());
    }

    #[test]
    fn test_rate_steps_stay_in_range() {
        let store = DeviceStore::new();
        store.insert("M1").unwrap();

        assert_eq!(store.decrease_rate("M1").unwrap(), 0);
        for _ in 0..12 {
            store.increase_rate("M1").unwrap();
        }
        assert_eq!(store.get("M1").unwrap().state().production_rate, 100);

        store.get("M1").unwrap().update(|s| s.production_rate = 95);
        assert_eq!(store.increase_rate("M1").unwrap(), 100);

        store.get("M1").unwrap().update(|s| s.production_rate = 5);
        assert_eq!(store.decrease_rate("M1").unwrap(), 5);
    }

    #[test]
    fn test_set_fault() {
        let store = DeviceStore::new();
        store.insert("M1").unwrap();
        store.set_fault("M1", DeviceError::SENSOR_FAILURE, true).unwrap();
        let errors = store.set_fault("M1", DeviceError::UNKNOWN, true).unwrap();
        assert_eq!(errors, DeviceError::SENSOR_FAILURE | DeviceError::UNKNOWN);
        let errors = store.set_fault("M1", DeviceError::SENSOR_FAILURE, false).unwrap();
        assert_eq!(errors, DeviceError::UNKNOWN);
    }

    #[test]
    fn test_unknown_device() {
        let store = DeviceStore::new();
        assert_eq!(
            store.start_production("ghost").unwrap_err(),
            SimError::DeviceNotFound("ghost".into())
        );
        assert!(store.remove("ghost").is_err());
    }
}
