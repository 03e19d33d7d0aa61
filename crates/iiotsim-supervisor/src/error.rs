//! Supervisor errors

use crate::supervisor::LoopKind;
use iiotsim_core::SimError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("node tree error: {0}")]
    Tree(#[from] SimError),

    #[error("{kind} loop terminated abnormally: {message}")]
    LoopFailed { kind: LoopKind, message: String },

    #[error("loops did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}
