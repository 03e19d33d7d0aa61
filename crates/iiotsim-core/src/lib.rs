//! IIoTSim Core Runtime
//!
//! This crate provides the simulated machine floor with:
//! - A shared store of device records and operator-side device management
//! - A stochastic simulation engine that advances production metrics
//! - A node registry exposing every device attribute and command
//! - A change-detecting sync loop that publishes diffs to the node tree
//! - Write-back and command handlers routing external input into the store

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod exposure;
pub mod node;
pub mod registry;
pub mod runtime;
pub mod simulation;
pub mod store;
pub mod sync;
pub mod writeback;

pub use command::Command;
pub use config::SimulatorConfig;
pub use device::{Device, DeviceError, DeviceSnapshot, DeviceState, ProductionStatus};
pub use error::{Result, SimError};
pub use exposure::{Exposure, LocalExposure};
pub use node::{Attribute, DataType, NodeKey, NodeUpdate, NodeValue, Sample, StatusCode};
pub use registry::NodeRegistry;
pub use runtime::Simulator;
pub use simulation::SimulationEngine;
pub use store::DeviceStore;
pub use sync::{SyncLoop, SyncReport};
