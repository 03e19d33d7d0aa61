//! Error taxonomy for the simulator core

use crate::node::{DataType, NodeKey};
use thiserror::Error;

/// Errors raised by the store, the node registry and the inbound handlers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("device name must not be empty")]
    EmptyDeviceName,

    #[error("device name '{0}' contains the reserved separator '/'")]
    ReservedSeparator(String),

    #[error("device '{0}' already exists")]
    DuplicateDevice(String),

    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error("no nodes registered for device '{0}'")]
    NodesMissing(String),

    #[error("node '{0}' not found")]
    NodeNotFound(String),

    #[error("node '{0}' is read-only")]
    ReadOnlyNode(NodeKey),

    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("type mismatch on '{key}': expected {expected}, got {actual}")]
    TypeMismatch {
        key: NodeKey,
        expected: DataType,
        actual: DataType,
    },

    #[error("value {value} is not a valid {target}")]
    InvalidValue { value: String, target: &'static str },

    #[error("exposure layer failed: {0}")]
    Exposure(String),

    #[error("node tree is offline until the next successful rebuild")]
    TreeOffline,
}

impl SimError {
    /// Structural faults stop the affected subsystem; everything else is
    /// contained to a single device or a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EmptyDeviceName
                | Self::ReservedSeparator(_)
                | Self::DeviceNotFound(_)
                | Self::DuplicateDevice(_)
                | Self::Exposure(_)
                | Self::TreeOffline
        )
    }
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
