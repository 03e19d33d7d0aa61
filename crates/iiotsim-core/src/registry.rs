//! Node registry
//!
//! Indexes every exposed node by device, so one device subtree can be added
//! or removed without disturbing the others. Structural changes take the tree
//! write lock; the sync loop and inbound requests take the read lock, so no
//! reader ever observes a partially built tree.

use crate::command::{self, Command};
use crate::device::{Device, DeviceState};
use crate::error::{Result, SimError};
use crate::exposure::Exposure;
use crate::node::{Attribute, DataType, NodeKey, NodeUpdate, NodeValue, Sample};
use crate::store::DeviceStore;
use crate::writeback;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock, RwLockReadGuard};

/// Callback bound to a writable node
pub type WriteHandler = Arc<dyn Fn(&NodeKey, &NodeValue) -> Result<Sample> + Send + Sync>;

/// Callback bound to a method node
pub type MethodHandler = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// A typed, timestamped attribute slot
pub struct VariableNode {
    key: NodeKey,
    data_type: DataType,
    sample: Mutex<Sample>,
    on_write: Option<WriteHandler>,
}

impl VariableNode {
    fn new(key: NodeKey, initial: Sample, on_write: Option<WriteHandler>) -> Self {
        Self {
            data_type: key.attribute.data_type(),
            key,
            sample: Mutex::new(initial),
            on_write,
        }
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_writable(&self) -> bool {
        self.on_write.is_some()
    }

    /// Last published sample
    pub fn sample(&self) -> Sample {
        self.sample.lock().clone()
    }

    /// Publish `value` only if it differs from the last published one
    pub fn publish_if_changed(
        &self,
        value: NodeValue,
        now: DateTime<Utc>,
    ) -> Result<Option<Sample>> {
        if value.data_type() != self.data_type {
            return Err(SimError::TypeMismatch {
                key: self.key.clone(),
                expected: self.data_type,
                actual: value.data_type(),
            });
        }

        let mut sample = self.sample.lock();
        if sample.value == value {
            return Ok(None);
        }
        *sample = Sample::good(value, now);
        Ok(Some(sample.clone()))
    }

    fn write(&self, value: &NodeValue) -> Result<Sample> {
        let handler = self
            .on_write
            .as_ref()
            .ok_or_else(|| SimError::ReadOnlyNode(self.key.clone()))?;
        let echo = handler(&self.key, value)?;
        *self.sample.lock() = echo.clone();
        Ok(echo)
    }
}

impl fmt::Debug for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableNode")
            .field("key", &self.key)
            .field("data_type", &self.data_type)
            .field("sample", &*self.sample.lock())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// A zero-argument remotely invocable action
pub struct MethodNode {
    command: Command,
    handler: MethodHandler,
}

impl MethodNode {
    pub fn command(&self) -> Command {
        self.command
    }

    pub fn invoke(&self) -> Result<()> {
        (self.handler)()
    }
}

/// All nodes belonging to one device
pub struct DeviceNodes {
    device: String,
    variables: BTreeMap<Attribute, VariableNode>,
    methods: Vec<MethodNode>,
}

impl DeviceNodes {
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn variable(&self, attribute: Attribute) -> Option<&VariableNode> {
        self.variables.get(&attribute)
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableNode> {
        self.variables.values()
    }

    pub fn method(&self, command: Command) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.command == command)
    }

    fn keys(&self) -> Vec<NodeKey> {
        self.variables.values().map(|v| v.key.clone()).collect()
    }

    fn method_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.command.name()).collect()
    }
}

/// The exposed tree guarded by the registry lock
#[derive(Default)]
pub struct NodeTree {
    devices: BTreeMap<String, DeviceNodes>,
    online: bool,
}

impl NodeTree {
    /// False after a failed rebuild until a later one succeeds
    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn device(&self, name: &str) -> Option<&DeviceNodes> {
        self.devices.get(name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Maps every `(device, attribute)` pair to its exposed node
pub struct NodeRegistry {
    store: Arc<DeviceStore>,
    exposure: Arc<dyn Exposure>,
    tree: RwLock<NodeTree>,
    updates: broadcast::Sender<NodeUpdate>,
}

impl NodeRegistry {
    pub fn new(
        store: Arc<DeviceStore>,
        exposure: Arc<dyn Exposure>,
        update_capacity: usize,
    ) -> Self {
        let (updates, _) = broadcast::channel(update_capacity.max(1));
        Self {
            store,
            exposure,
            tree: RwLock::new(NodeTree::default()),
            updates,
        }
    }

    /// Build the nodes for one device, seeded with its current values
    fn build(&self, device: &Device) -> DeviceNodes {
        let name = device.name().to_string();
        let state = device.state();
        let now = Utc::now();

        let variables = Attribute::ALL
            .into_iter()
            .map(|attribute| {
                let key = NodeKey::new(name.clone(), attribute);
                let initial = Sample::good(state.attribute_value(attribute), now);
                let on_write: Option<WriteHandler> = attribute.is_writable().then(|| {
                    let store = self.store.clone();
                    Arc::new(move |key: &NodeKey, value: &NodeValue| {
                        writeback::write_production_rate(&store, key, value)
                    }) as WriteHandler
                });
                (attribute, VariableNode::new(key, initial, on_write))
            })
            .collect();

        let methods = Command::ALL
            .into_iter()
            .map(|method| {
                let store = self.store.clone();
                let device = name.clone();
                MethodNode {
                    command: method,
                    handler: Arc::new(move || command::invoke(&store, &device, method)),
                }
            })
            .collect();

        DeviceNodes {
            device: name,
            variables,
            methods,
        }
    }

    async fn mount(&self, nodes: &DeviceNodes) -> Result<()> {
        self.exposure
            .mount(&nodes.device, &nodes.keys(), &nodes.method_names())
            .await
    }

    /// Add one device subtree without touching the others
    pub async fn register(&self, device: &Device) -> Result<()> {
        let mut tree = self.tree.write().await;
        if !tree.online {
            return Err(SimError::TreeOffline);
        }
        if tree.devices.contains_key(device.name()) {
            return Err(SimError::DuplicateDevice(device.name().to_string()));
        }

        let nodes = self.build(device);
        self.mount(&nodes).await?;
        tree.devices.insert(nodes.device.clone(), nodes);
        tracing::info!(device = device.name(), "device nodes registered");
        Ok(())
    }

    /// Remove one device subtree without touching the others
    pub async fn unregister(&self, name: &str) -> Result<()> {
        let mut tree = self.tree.write().await;
        if !tree.devices.contains_key(name) {
            return Err(SimError::NodesMissing(name.to_string()));
        }
        if tree.online {
            self.exposure.unmount(name).await?;
        }
        tree.devices.remove(name);
        tracing::info!(device = name, "device nodes unregistered");
        Ok(())
    }

    /// Tear down and recreate the whole tree from the store
    ///
    /// The tree stays offline if the exposure layer fails, which blocks the
    /// sync loop until a later rebuild succeeds.
    pub async fn rebuild(&self) -> Result<usize> {
        let mut tree = self.tree.write().await;
        tree.online = false;

        if let Err(err) = self.exposure.stop().await {
            tracing::warn!(error = %err, "exposure stop failed during rebuild");
        }
        tree.devices.clear();

        if let Err(err) = self.exposure.start().await {
            tracing::error!(error = %err, "exposure failed to start, node tree offline");
            return Err(err);
        }

        for device in self.store.snapshot() {
            let nodes = self.build(&device);
            if let Err(err) = self.mount(&nodes).await {
                tracing::error!(
                    device = device.name(),
                    error = %err,
                    "rebuild failed, node tree offline"
                );
                // Withdraw the subtrees mounted before the failure
                if let Err(stop) = self.exposure.stop().await {
                    tracing::warn!(error = %stop, "exposure stop failed after rebuild error");
                }
                tree.devices.clear();
                return Err(err);
            }
            tree.devices.insert(nodes.device.clone(), nodes);
        }

        tree.online = true;
        let count = tree.devices.len();
        tracing::info!(devices = count, "node tree rebuilt");
        Ok(count)
    }

    /// Stop serving the tree
    pub async fn shutdown(&self) -> Result<()> {
        let mut tree = self.tree.write().await;
        tree.online = false;
        tree.devices.clear();
        self.exposure.stop().await
    }

    /// Shared view of the tree for change detection
    pub async fn read_tree(&self) -> RwLockReadGuard<'_, NodeTree> {
        self.tree.read().await
    }

    pub async fn is_online(&self) -> bool {
        self.tree.read().await.online
    }

    /// Every variable address currently exposed, ordered
    pub async fn browse(&self) -> Vec<NodeKey> {
        let tree = self.tree.read().await;
        tree.devices
            .values()
            .flat_map(DeviceNodes::keys)
            .collect()
    }

    /// Names of the devices with a registered subtree
    pub async fn devices(&self) -> Vec<String> {
        self.tree.read().await.devices.keys().cloned().collect()
    }

    /// Last published sample of a node
    pub async fn read(&self, key: &NodeKey) -> Result<Sample> {
        let tree = self.online_tree().await?;
        Ok(Self::variable(&tree, key)?.sample())
    }

    /// Rebuild a device state from its published nodes
    pub async fn published_state(&self, device: &str) -> Result<DeviceState> {
        let tree = self.online_tree().await?;
        let nodes = tree
            .device(device)
            .ok_or_else(|| SimError::NodesMissing(device.to_string()))?;

        let mut state = DeviceState::default();
        for node in nodes.variables() {
            state.apply_attribute(node.key.attribute, &node.sample().value)?;
        }
        Ok(state)
    }

    /// External write; only nodes with a bound write handler accept it
    pub async fn write(&self, key: &NodeKey, value: NodeValue) -> Result<Sample> {
        let tree = self.online_tree().await?;
        let node = Self::variable(&tree, key)?;
        let echo = node.write(&value)?;
        self.notify(NodeUpdate {
            key: key.clone(),
            sample: echo.clone(),
        });
        Ok(echo)
    }

    /// External method invocation
    pub async fn call(&self, device: &str, command: Command) -> Result<()> {
        let tree = self.online_tree().await?;
        let method = tree
            .device(device)
            .and_then(|nodes| nodes.method(command))
            .ok_or_else(|| SimError::NodeNotFound(format!("{device}/{command}")))?;
        method.invoke()
    }

    /// Receive every publication from now on
    pub fn subscribe(&self) -> broadcast::Receiver<NodeUpdate> {
        self.updates.subscribe()
    }

    pub(crate) fn notify(&self, update: NodeUpdate) {
        // No subscribers is not an error
        let _ = self.updates.send(update);
    }

    async fn online_tree(&self) -> Result<RwLockReadGuard<'_, NodeTree>> {
        let tree = self.tree.read().await;
        if !tree.online {
            return Err(SimError::TreeOffline);
        }
        Ok(tree)
    }

    fn variable<'a>(tree: &'a NodeTree, key: &NodeKey) -> Result<&'a VariableNode> {
        tree.device(&key.device)
            .and_then(|nodes| nodes.variable(key.attribute))
            .ok_or_else(|| SimError::NodeNotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::LocalExposure;

    async fn online_registry() -> (Arc<DeviceStore>, NodeRegistry) {
        let store = Arc::new(DeviceStore::new());
        let registry = NodeRegistry::new(store.clone(), Arc::new(LocalExposure::new()), 16);
        registry.rebuild().await.unwrap();
        (store, registry)
    }

    #[tokio::test]
    async fn test_register_creates_seeded_nodes() {
        let (store, registry) = online_registry().await;
        let device = store.insert("M1").unwrap();
        device.update(|s| s.production_rate = 30);
        registry.register(&device).await.unwrap();

        let keys = registry.browse().await;
        assert_eq!(keys.len(), Attribute::ALL.len());

        let rate = registry
            .read(&NodeKey::new("M1", Attribute::ProductionRate))
            .await
            .unwrap();
        assert_eq!(rate.value, NodeValue::Int32(30));
    }

    #[tokio::test]
    async fn test_register_twice_is_rejected() {
        let (store, registry) = online_registry().await;
        let device = store.insert("M1").unwrap();
        registry.register(&device).await.unwrap();
        assert_eq!(
            registry.register(&device).await.unwrap_err(),
            SimError::DuplicateDevice("M1".into())
        );
    }

    #[tokio::test]
    async fn test_register_requires_online_tree() {
        let store = Arc::new(DeviceStore::new());
        let registry = NodeRegistry::new(store.clone(), Arc::new(LocalExposure::new()), 16);
        let device = store.insert("M1").unwrap();
        assert_eq!(
            registry.register(&device).await.unwrap_err(),
            SimError::TreeOffline
        );
    }

    #[test]
    fn test_publish_if_changed() {
        let key = NodeKey::new("M1", Attribute::GoodCount);
        let node = VariableNode::new(key, Sample::good(NodeValue::Int64(0), Utc::now()), None);

        assert!(node.publish_if_changed(NodeValue::Int64(0), Utc::now()).unwrap().is_none());
        let published = node
            .publish_if_changed(NodeValue::Int64(3), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(published.value, NodeValue::Int64(3));
        assert!(matches!(
            node.publish_if_changed(NodeValue::Int32(3), Utc::now()),
            Err(SimError::TypeMismatch { .. })
        ));
    }
}
