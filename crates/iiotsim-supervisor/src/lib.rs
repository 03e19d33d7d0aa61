//! IIoTSim Supervisor
//!
//! Lifecycle management for the simulator's periodic loops:
//! - One shared cooperative cancellation token for both loops
//! - A termination flag per loop, set even if the loop panics
//! - Awaited shutdown, optionally bounded by a deadline

pub mod error;
pub mod supervisor;

pub use error::SupervisorError;
pub use supervisor::{LoopKind, Supervisor};
