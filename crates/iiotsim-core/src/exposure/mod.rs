//! Exposure layer boundary
//!
//! The transport that serves the node tree to outside actors lives behind
//! this trait. The registry drives it: whole-tree start/stop around a rebuild,
//! and per-device mount/unmount for incremental membership changes.

pub mod local;

pub use local::LocalExposure;

use crate::error::Result;
use crate::node::NodeKey;

/// Transport serving the node tree
#[async_trait::async_trait]
pub trait Exposure: Send + Sync {
    /// Begin serving the tree
    async fn start(&self) -> Result<()>;

    /// Stop serving the tree
    async fn stop(&self) -> Result<()>;

    /// Publish one device subtree (variables plus its method names)
    async fn mount(&self, device: &str, variables: &[NodeKey], methods: &[&str]) -> Result<()>;

    /// Withdraw one device subtree
    async fn unmount(&self, device: &str) -> Result<()>;
}
