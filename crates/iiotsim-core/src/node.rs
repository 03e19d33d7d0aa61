//! Node addressing and published values
//!
//! Every device attribute is exposed as a typed node addressed by
//! `deviceName/attributeName`. Keys are structured `(device, attribute)`
//! pairs, so no device name can forge another device's address.

use crate::error::SimError;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator used in the textual node address
pub const ADDRESS_SEPARATOR: char = '/';

/// The seven exposed attributes of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    ProductionStatus,
    WorkorderId,
    ProductionRate,
    GoodCount,
    BadCount,
    Temperature,
    DeviceError,
}

impl Attribute {
    pub const ALL: [Attribute; 7] = [
        Attribute::ProductionStatus,
        Attribute::WorkorderId,
        Attribute::ProductionRate,
        Attribute::GoodCount,
        Attribute::BadCount,
        Attribute::Temperature,
        Attribute::DeviceError,
    ];

    /// Browse name of the node
    pub fn name(self) -> &'static str {
        match self {
            Self::ProductionStatus => "productionStatus",
            Self::WorkorderId => "workorderId",
            Self::ProductionRate => "productionRate",
            Self::GoodCount => "goodCount",
            Self::BadCount => "badCount",
            Self::Temperature => "temperature",
            Self::DeviceError => "deviceError",
        }
    }

    /// Exposed value type
    pub fn data_type(self) -> DataType {
        match self {
            Self::ProductionStatus | Self::ProductionRate | Self::DeviceError => DataType::Int32,
            Self::WorkorderId => DataType::String,
            Self::GoodCount | Self::BadCount => DataType::Int64,
            Self::Temperature => DataType::Double,
        }
    }

    /// Only the production rate accepts external writes
    pub fn is_writable(self) -> bool {
        matches!(self, Self::ProductionRate)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.name() == s)
            .ok_or_else(|| SimError::UnknownAttribute(s.to_string()))
    }
}

/// Wire type of a node value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int32,
    Int64,
    Double,
    String,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Double => "Double",
            Self::String => "String",
        };
        f.write_str(name)
    }
}

/// Value held by a variable node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeValue {
    Int32(i32),
    Int64(i64),
    Double(OrderedFloat<f64>),
    String(String),
}

impl NodeValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
        }
    }

    /// Zero value for a type
    pub fn default_for(data_type: DataType) -> Self {
        match data_type {
            DataType::Int32 => Self::Int32(0),
            DataType::Int64 => Self::Int64(0),
            DataType::Double => Self::Double(OrderedFloat(0.0)),
            DataType::String => Self::String(String::new()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(i) => Some(i64::from(*i)),
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(i) => write!(f, "{i}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i32> for NodeValue {
    fn from(i: i32) -> Self {
        Self::Int32(i)
    }
}

impl From<i64> for NodeValue {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<f64> for NodeValue {
    fn from(f: f64) -> Self {
        Self::Double(OrderedFloat(f))
    }
}

impl From<String> for NodeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for NodeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// Quality marker attached to a published sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Good,
    Uncertain,
    Bad,
}

/// A value together with its status and source timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub value: NodeValue,
    pub status: StatusCode,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn good(value: NodeValue, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            status: StatusCode::Good,
            timestamp,
        }
    }
}

/// Structured node address: `(device name, attribute)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub device: String,
    pub attribute: Attribute,
}

impl NodeKey {
    pub fn new(device: impl Into<String>, attribute: Attribute) -> Self {
        Self {
            device: device.into(),
            attribute,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{ADDRESS_SEPARATOR}{}", self.device, self.attribute)
    }
}

impl FromStr for NodeKey {
    type Err = SimError;

    /// Parse a `deviceName/attributeName` address
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device, attribute) = s
            .split_once(ADDRESS_SEPARATOR)
            .ok_or_else(|| SimError::NodeNotFound(s.to_string()))?;
        if device.is_empty() {
            return Err(SimError::EmptyDeviceName);
        }
        Ok(Self::new(device, attribute.parse()?))
    }
}

/// A publication pushed to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub key: NodeKey,
    pub sample: Sample,
}
