//! Simulated machine model
//!
//! A [`Device`] pairs an immutable name with a lock-guarded [`DeviceState`].
//! The simulation engine, sync loop and inbound handlers all mutate or read
//! the state through that lock, so a reader never sees a torn record.

use crate::error::{Result, SimError};
use crate::node::{Attribute, NodeValue};
use bitflags::bitflags;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Production state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProductionStatus {
    #[default]
    Stopped = 0,
    Running = 1,
}

impl ProductionStatus {
    pub fn ordinal(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ProductionStatus {
    type Error = SimError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Stopped),
            1 => Ok(Self::Running),
            other => Err(SimError::InvalidValue {
                value: other.to_string(),
                target: "production status",
            }),
        }
    }
}

bitflags! {
    /// Active fault flags of a machine
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DeviceError: u8 {
        const EMERGENCY_STOP = 0b0001;
        const POWER_FAILURE = 0b0010;
        const SENSOR_FAILURE = 0b0100;
        const UNKNOWN = 0b1000;
    }
}

impl DeviceError {
    /// Bit pattern as published on the `deviceError` node
    pub fn to_i32(self) -> i32 {
        i32::from(self.bits())
    }

    /// Inverse of [`DeviceError::to_i32`]; undefined bits are rejected
    pub fn from_i32(value: i32) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .and_then(Self::from_bits)
            .ok_or_else(|| SimError::InvalidValue {
                value: value.to_string(),
                target: "device error set",
            })
    }

    /// Operator-facing descriptions, most severe last
    pub fn descriptions(self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(Self::UNKNOWN) {
            out.push("Unknown");
        }
        if self.contains(Self::SENSOR_FAILURE) {
            out.push("Sensor Failure");
        }
        if self.contains(Self::POWER_FAILURE) {
            out.push("Power Failure");
        }
        if self.contains(Self::EMERGENCY_STOP) {
            out.push("Emergency Stop");
        }
        if out.is_empty() {
            out.push("No errors");
        }
        out
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptions().join(", "))
    }
}

/// Mutable runtime state of one machine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceState {
    pub production_status: ProductionStatus,
    pub workorder_id: Uuid,
    pub production_rate: i32,
    pub good_count: i64,
    pub bad_count: i64,
    pub temperature: f64,
    pub device_error: DeviceError,
}

impl DeviceState {
    pub fn is_emergency_stop(&self) -> bool {
        self.device_error.contains(DeviceError::EMERGENCY_STOP)
    }

    pub fn is_power_failure(&self) -> bool {
        self.device_error.contains(DeviceError::POWER_FAILURE)
    }

    pub fn is_sensor_failure(&self) -> bool {
        self.device_error.contains(DeviceError::SENSOR_FAILURE)
    }

    pub fn is_unknown_error(&self) -> bool {
        self.device_error.contains(DeviceError::UNKNOWN)
    }

    /// Whether the machine should produce units this tick
    pub fn is_producing(&self) -> bool {
        self.production_status == ProductionStatus::Running
            && self.production_rate > 0
            && !self.is_emergency_stop()
    }

    /// Convert one field to its published node value
    pub fn attribute_value(&self, attribute: Attribute) -> NodeValue {
        match attribute {
            Attribute::ProductionStatus => NodeValue::Int32(self.production_status.ordinal()),
            Attribute::WorkorderId => NodeValue::String(self.workorder_id.hyphenated().to_string()),
            Attribute::ProductionRate => NodeValue::Int32(self.production_rate),
            Attribute::GoodCount => NodeValue::Int64(self.good_count),
            Attribute::BadCount => NodeValue::Int64(self.bad_count),
            Attribute::Temperature => NodeValue::from(self.temperature),
            Attribute::DeviceError => NodeValue::Int32(self.device_error.to_i32()),
        }
    }

    /// Inverse of [`DeviceState::attribute_value`]
    pub fn apply_attribute(&mut self, attribute: Attribute, value: &NodeValue) -> Result<()> {
        let invalid = |target: &'static str| SimError::InvalidValue {
            value: value.to_string(),
            target,
        };

        match (attribute, value) {
            (Attribute::ProductionStatus, NodeValue::Int32(v)) => {
                self.production_status = ProductionStatus::try_from(*v)?;
            }
            (Attribute::WorkorderId, NodeValue::String(s)) => {
                self.workorder_id = Uuid::parse_str(s).map_err(|_| invalid("workorder id"))?;
            }
            (Attribute::ProductionRate, NodeValue::Int32(v)) => {
                if !(0..=100).contains(v) {
                    return Err(invalid("production rate"));
                }
                self.production_rate = *v;
            }
            (Attribute::GoodCount, NodeValue::Int64(v)) => self.good_count = *v,
            (Attribute::BadCount, NodeValue::Int64(v)) => self.bad_count = *v,
            (Attribute::Temperature, NodeValue::Double(v)) => self.temperature = v.into_inner(),
            (Attribute::DeviceError, NodeValue::Int32(v)) => {
                self.device_error = DeviceError::from_i32(*v)?;
            }
            _ => return Err(invalid(attribute.name())),
        }
        Ok(())
    }
}

/// A simulated machine: stable name plus guarded state
#[derive(Debug)]
pub struct Device {
    name: String,
    state: RwLock<DeviceState>,
}

impl Device {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            state: RwLock::new(DeviceState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consistent copy of the current state
    pub fn state(&self) -> DeviceState {
        self.state.read().clone()
    }

    /// Mutate the state under the device lock
    pub fn update<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.state.write())
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot::new(&self.name, &self.state())
    }
}

/// Serializable telemetry view of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub name: String,
    pub production_status: ProductionStatus,
    pub workorder_id: Uuid,
    pub production_rate: i32,
    pub good_count: i64,
    pub bad_count: i64,
    pub temperature: f64,
    pub device_error: i32,
    pub errors: Vec<String>,
}

impl DeviceSnapshot {
    pub fn new(name: &str, state: &DeviceState) -> Self {
        Self {
            name: name.to_string(),
            production_status: state.production_status,
            workorder_id: state.workorder_id,
            production_rate: state.production_rate,
            good_count: state.good_count,
            bad_count: state.bad_count,
            temperature: state.temperature,
            device_error: state.device_error.to_i32(),
            errors: state
                .device_error
                .descriptions()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}
