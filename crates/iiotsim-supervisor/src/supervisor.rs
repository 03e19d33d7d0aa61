//! Owner of the simulation and sync tasks

use crate::error::SupervisorError;
use futures::future::join_all;
use iiotsim_core::Simulator;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The periodic loops under supervision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Simulation,
    Sync,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulation => write!(f, "simulation"),
            Self::Sync => write!(f, "sync"),
        }
    }
}

/// Raises the termination flag when the task ends, normally or by panic
struct TerminationGuard(Arc<AtomicBool>);

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct LoopHandle {
    kind: LoopKind,
    terminated: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    fn spawn<F>(kind: LoopKind, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let terminated = Arc::new(AtomicBool::new(false));
        let guard = TerminationGuard(terminated.clone());
        let join = tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
        Self {
            kind,
            terminated,
            join,
        }
    }
}

/// Runs both periodic loops against one simulator
pub struct Supervisor {
    simulator: Arc<Simulator>,
    token: CancellationToken,
    loops: Vec<LoopHandle>,
}

impl Supervisor {
    /// Bring the node tree online, then spawn both loops
    pub async fn start(simulator: Arc<Simulator>) -> Result<Self, SupervisorError> {
        let devices = simulator.start().await?;
        tracing::info!(devices, "node tree online");
        Ok(Self::spawn(simulator))
    }

    /// Spawn both loops without touching the node tree
    pub fn spawn(simulator: Arc<Simulator>) -> Self {
        let token = CancellationToken::new();
        let loops = vec![
            LoopHandle::spawn(
                LoopKind::Simulation,
                simulator.engine().clone().run(token.clone()),
            ),
            LoopHandle::spawn(LoopKind::Sync, simulator.sync().clone().run(token.clone())),
        ];

        Self {
            simulator,
            token,
            loops,
        }
    }

    pub fn simulator(&self) -> &Arc<Simulator> {
        &self.simulator
    }

    /// Token observed by both loops
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request cancellation; each loop finishes its current tick
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_terminated(&self, kind: LoopKind) -> bool {
        self.loops
            .iter()
            .filter(|handle| handle.kind == kind)
            .all(|handle| handle.terminated.load(Ordering::SeqCst))
    }

    pub fn all_terminated(&self) -> bool {
        self.loops
            .iter()
            .all(|handle| handle.terminated.load(Ordering::SeqCst))
    }

    /// Cancel, wait for both loops, then take the node tree offline
    pub async fn shutdown(self) -> Result<(), SupervisorError> {
        self.token.cancel();

        let results = join_all(self.loops.into_iter().map(|handle| async move {
            handle
                .join
                .await
                .map_err(|err| SupervisorError::LoopFailed {
                    kind: handle.kind,
                    message: err.to_string(),
                })
        }))
        .await;

        for result in &results {
            if let Err(err) = result {
                tracing::error!(error = %err, "loop did not stop cleanly");
            }
        }

        self.simulator.stop().await?;
        tracing::info!("supervisor stopped");

        results.into_iter().collect()
    }

    /// [`Supervisor::shutdown`] bounded by a deadline
    pub async fn shutdown_timeout(self, timeout: Duration) -> Result<(), SupervisorError> {
        tokio::time::timeout(timeout, self.shutdown())
            .await
            .map_err(|_| SupervisorError::ShutdownTimeout(timeout))?
    }
}
