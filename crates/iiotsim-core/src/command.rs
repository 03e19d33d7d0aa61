//! Remote commands exposed as zero-argument methods on each device

use crate::device::{DeviceError, DeviceState, ProductionStatus};
use crate::error::{Result, SimError};
use crate::store::DeviceStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Invocable device method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Halt production and latch the emergency-stop flag
    EmergencyStop,
    /// Clear every fault flag
    ResetErrorStatus,
}

impl Command {
    pub const ALL: [Command; 2] = [Command::EmergencyStop, Command::ResetErrorStatus];

    pub fn name(self) -> &'static str {
        match self {
            Self::EmergencyStop => "EmergencyStop",
            Self::ResetErrorStatus => "ResetErrorStatus",
        }
    }

    pub fn apply(self, state: &mut DeviceState) {
        match self {
            Self::EmergencyStop => {
                state.production_status = ProductionStatus::Stopped;
                state.device_error.insert(DeviceError::EMERGENCY_STOP);
            }
            Self::ResetErrorStatus => state.device_error = DeviceError::empty(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.name() == s)
            .ok_or_else(|| SimError::NodeNotFound(s.to_string()))
    }
}

/// Apply a command to the named device
pub fn invoke(store: &DeviceStore, device: &str, command: Command) -> Result<()> {
    let errors = store.get(device)?.update(|state| {
        command.apply(state);
        state.device_error
    });
    tracing::info!(device, %command, errors = %errors, "command invoked");
    Ok(())
}
