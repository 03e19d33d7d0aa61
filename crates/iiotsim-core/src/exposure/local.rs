//! In-process exposure for embedding and testing

use crate::error::{Result, SimError};
use crate::exposure::Exposure;
use crate::node::NodeKey;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Exposure that serves the tree in-process (non-networked)
#[derive(Debug, Default)]
pub struct LocalExposure {
    running: AtomicBool,
    starts: AtomicU64,
    mounted: DashMap<String, usize>,
}

impl LocalExposure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// How many times the tree was (re)started
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn is_mounted(&self, device: &str) -> bool {
        self.mounted.contains_key(device)
    }

    /// Number of nodes served for a device, methods included
    pub fn mounted_nodes(&self, device: &str) -> Option<usize> {
        self.mounted.get(device).map(|n| *n)
    }
}

#[async_trait]
impl Exposure for LocalExposure {
    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.mounted.clear();
        Ok(())
    }

    async fn mount(&self, device: &str, variables: &[NodeKey], methods: &[&str]) -> Result<()> {
        if !self.is_running() {
            return Err(SimError::Exposure(format!(
                "cannot mount '{device}' while stopped"
            )));
        }
        self.mounted
            .insert(device.to_string(), variables.len() + methods.len());
        Ok(())
    }

    async fn unmount(&self, device: &str) -> Result<()> {
        self.mounted.remove(device);
        Ok(())
    }
}
