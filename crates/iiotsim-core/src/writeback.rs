//! Inbound writes to the production-rate node

use crate::error::{Result, SimError};
use crate::node::{Attribute, NodeKey, NodeValue, Sample};
use crate::store::DeviceStore;
use chrono::Utc;

pub const MIN_RATE: i32 = 0;
pub const MAX_RATE: i32 = 100;

/// Clamp a raw request into the accepted rate band
pub fn clamp_rate(raw: i64) -> i32 {
    // The clamp keeps the result well inside i32
    raw.clamp(i64::from(MIN_RATE), i64::from(MAX_RATE)) as i32
}

/// Read a numeric write request; doubles truncate toward zero and saturate
fn requested_rate(key: &NodeKey, value: &NodeValue) -> Result<i64> {
    match value {
        NodeValue::Int32(v) => Ok(i64::from(*v)),
        NodeValue::Int64(v) => Ok(*v),
        NodeValue::Double(v) if v.is_nan() => Err(SimError::InvalidValue {
            value: value.to_string(),
            target: "production rate",
        }),
        NodeValue::Double(v) => Ok(v.into_inner() as i64),
        NodeValue::String(_) => Err(SimError::TypeMismatch {
            key: key.clone(),
            expected: Attribute::ProductionRate.data_type(),
            actual: value.data_type(),
        }),
    }
}

/// Apply a production-rate write and return the effective sample
///
/// The owning device is resolved by the node's device name. A missing device
/// means the registry and the store disagree, which is surfaced as a fatal
/// [`SimError::DeviceNotFound`] rather than retried.
pub fn write_production_rate(
    store: &DeviceStore,
    key: &NodeKey,
    value: &NodeValue,
) -> Result<Sample> {
    if key.attribute != Attribute::ProductionRate {
        return Err(SimError::ReadOnlyNode(key.clone()));
    }

    let requested = requested_rate(key, value)?;
    let rate = clamp_rate(requested);
    let device = store.get(&key.device)?;
    device.update(|state| state.production_rate = rate);

    tracing::info!(device = %key.device, requested, applied = rate, "production rate written");
    Ok(Sample::good(NodeValue::Int32(rate), Utc::now()))
}
