//! Simulated device stack
//!
//! Commands are validated on the calling task and then handed to a
//! dedicated delivery thread, which plays the part of the stack's event loop:
//! it produces result items from an in-memory device model and invokes the
//! callbacks from outside the async runtime.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mbridge_core::{
    status, CommissioningWindow, GroupAction, GroupId, GroupInfo, ItemPath, NodeId,
    PairingMethod, PathSet, ResultItem, StackCommand, StackError, StackResult, Value,
    MAX_GROUP_NAME_LEN,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::setup_code::{encode_manual, SetupPayload};
use super::DeviceStack;
use crate::config::{SimulatedConfig, SimulatedItemConfig, SimulatedNodeConfig};
use crate::dispatcher::CallbackHandle;

/// AdministratorCommissioning cluster
const ADMIN_COMMISSIONING_CLUSTER: u32 = 0x003C;
const OPEN_COMMISSIONING_WINDOW: u32 = 0x00;
const OPEN_BASIC_COMMISSIONING_WINDOW: u32 = 0x01;

/// In-memory model of one device
#[derive(Debug, Clone, Default)]
struct SimNode {
    responsive: bool,
    attributes: HashMap<ItemPath, Value>,
    events: HashMap<ItemPath, Value>,
}

impl SimNode {
    fn from_config(config: &SimulatedNodeConfig) -> StackResult<Self> {
        Ok(Self {
            responsive: config.responsive,
            attributes: decode_items(&config.attributes)?,
            events: decode_items(&config.events)?,
        })
    }
}

fn decode_items(items: &[SimulatedItemConfig]) -> StackResult<HashMap<ItemPath, Value>> {
    items
        .iter()
        .map(|item| {
            let value = item
                .value()
                .map_err(|e| StackError::InvalidArgument(e.to_string()))?;
            Ok((ItemPath::new(item.endpoint, item.cluster, item.id), value))
        })
        .collect()
}

/// State shared between the issuing side and the delivery thread
#[derive(Debug)]
struct Shared {
    latency: Duration,
    setup_pincode: u32,
    nodes: RwLock<HashMap<NodeId, SimNode>>,
    subscriptions: Mutex<HashMap<NodeId, HashSet<u32>>>,
    next_subscription_id: AtomicU32,
    groups: Mutex<BTreeMap<GroupId, String>>,
}

struct Job {
    command: StackCommand,
    callbacks: CallbackHandle,
}

/// Stack backed by simulated nodes
pub struct SimulatedStack {
    shared: Arc<Shared>,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SimulatedStack {
    pub fn new(config: &SimulatedConfig) -> StackResult<Self> {
        let mut nodes = HashMap::new();
        for node in &config.nodes {
            nodes.insert(node.node_id, SimNode::from_config(node)?);
        }

        let shared = Arc::new(Shared {
            latency: Duration::from_millis(config.latency_ms),
            setup_pincode: config.setup_pincode,
            nodes: RwLock::new(nodes),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription_id: AtomicU32::new(1),
            groups: Mutex::new(BTreeMap::new()),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("stack-delivery".to_string())
                .spawn(move || delivery_loop(shared, rx))
                .map_err(|e| StackError::Transport(format!("Failed to start delivery thread: {}", e)))?
        };

        info!(
            nodes = config.nodes.len(),
            latency_ms = config.latency_ms,
            "Simulated stack started"
        );

        Ok(Self {
            shared,
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        })
    }

    /// Add or replace a node
    pub fn add_node(&self, config: &SimulatedNodeConfig) -> StackResult<()> {
        let node = SimNode::from_config(config)?;
        self.shared.nodes.write().insert(config.node_id, node);
        Ok(())
    }

    /// Make a node stop (or resume) completing its operations
    pub fn set_responsive(&self, node_id: NodeId, responsive: bool) -> StackResult<()> {
        let mut nodes = self.shared.nodes.write();
        let node = nodes
            .get_mut(&node_id)
            .ok_or(StackError::UnknownNode(node_id))?;
        node.responsive = responsive;
        Ok(())
    }

    /// Current value of an attribute
    pub fn attribute(&self, node_id: NodeId, path: ItemPath) -> Option<Value> {
        self.shared
            .nodes
            .read()
            .get(&node_id)
            .and_then(|node| node.attributes.get(&path).cloned())
    }

    pub fn has_node(&self, node_id: NodeId) -> bool {
        self.shared.nodes.read().contains_key(&node_id)
    }

    /// Number of live subscriptions across all nodes
    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.lock().values().map(HashSet::len).sum()
    }

    /// Stop the delivery thread. Queued jobs are delivered first.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender ends the delivery loop once the queue drains
        self.jobs.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Stack delivery thread panicked");
            }
        }
        info!("Simulated stack closed");
    }

    fn validate(&self, command: &StackCommand) -> StackResult<()> {
        let check_paths = |paths: &PathSet| paths.check_bounds().map(|_| ());

        if let StackCommand::Pair(method) = command {
            return match method {
                PairingMethod::BleWifi { ssid, .. } if ssid.is_empty() => Err(
                    StackError::InvalidArgument("ssid must not be empty".to_string()),
                ),
                PairingMethod::BleThread { dataset, .. } if dataset.is_empty() => Err(
                    StackError::InvalidArgument("dataset must not be empty".to_string()),
                ),
                PairingMethod::Code { payload, .. } => SetupPayload::parse(payload).map(|_| ()),
                _ => Ok(()),
            };
        }

        let node_id = command.node_id();
        if !self.has_node(node_id) {
            return Err(StackError::UnknownNode(node_id));
        }

        match command {
            StackCommand::ReadAttribute { paths, .. }
            | StackCommand::WriteAttribute { paths, .. }
            | StackCommand::ReadEvent { paths, .. } => check_paths(paths),
            StackCommand::SubscribeAttribute {
                paths,
                min_interval_s,
                max_interval_s,
                ..
            }
            | StackCommand::SubscribeEvent {
                paths,
                min_interval_s,
                max_interval_s,
                ..
            } => {
                check_paths(paths)?;
                if min_interval_s > max_interval_s {
                    return Err(StackError::InvalidArgument(format!(
                        "min_interval ({}) exceeds max_interval ({})",
                        min_interval_s, max_interval_s
                    )));
                }
                Ok(())
            }
            StackCommand::OpenCommissioningWindow(window) if window.window_timeout_s == 0 => Err(
                StackError::InvalidArgument("window_timeout must be non-zero".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

impl Drop for SimulatedStack {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SimulatedStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedStack")
            .field("nodes", &self.shared.nodes.read().len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl DeviceStack for SimulatedStack {
    fn name(&self) -> &str {
        "simulated"
    }

    fn issue(&self, command: StackCommand, callbacks: CallbackHandle) -> StackResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StackError::Closed);
        }
        self.validate(&command)?;

        debug!(command = command.name(), key = %callbacks.key(), "Command accepted");
        let jobs = self.jobs.lock();
        let sender = jobs.as_ref().ok_or(StackError::Closed)?;
        sender
            .send(Job { command, callbacks })
            .map_err(|_| StackError::Closed)
    }

    fn shutdown_subscription(&self, node_id: NodeId, subscription_id: u32) -> StackResult<()> {
        let mut subscriptions = self.shared.subscriptions.lock();
        let removed = subscriptions
            .get_mut(&node_id)
            .map(|ids| ids.remove(&subscription_id))
            .unwrap_or(false);
        if !removed {
            return Err(StackError::SubscriptionNotFound {
                node_id,
                subscription_id,
            });
        }
        debug!(node_id, subscription_id, "Subscription shut down");
        Ok(())
    }

    fn shutdown_subscriptions(&self, node_id: Option<NodeId>) -> StackResult<()> {
        let mut subscriptions = self.shared.subscriptions.lock();
        match node_id {
            Some(node_id) => {
                subscriptions.remove(&node_id);
            }
            None => subscriptions.clear(),
        }
        debug!(?node_id, "Subscriptions shut down");
        Ok(())
    }

    fn group_settings(&self, action: GroupAction) -> StackResult<Vec<GroupInfo>> {
        let mut groups = self.shared.groups.lock();
        match action {
            GroupAction::Show => {}
            GroupAction::Add { group_id, name } => {
                if group_id == 0 {
                    return Err(StackError::InvalidArgument(
                        "group_id 0 is reserved".to_string(),
                    ));
                }
                if name.is_empty() || name.len() > MAX_GROUP_NAME_LEN {
                    return Err(StackError::InvalidArgument(format!(
                        "group_name must be 1 to {} bytes",
                        MAX_GROUP_NAME_LEN
                    )));
                }
                debug!(group_id, %name, "Group added");
                groups.insert(group_id, name);
            }
            GroupAction::Remove { group_id } => {
                groups
                    .remove(&group_id)
                    .ok_or(StackError::GroupNotFound(group_id))?;
                debug!(group_id, "Group removed");
            }
        }
        Ok(groups
            .iter()
            .map(|(group_id, name)| GroupInfo {
                group_id: *group_id,
                name: name.clone(),
            })
            .collect())
    }
}

// =============================================================================
// Delivery thread
// =============================================================================

fn delivery_loop(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.blocking_recv() {
        if !shared.latency.is_zero() {
            thread::sleep(shared.latency);
        }
        deliver(&shared, job);
    }
    debug!("Stack delivery loop finished");
}

fn deliver(shared: &Shared, job: Job) {
    let Job { command, callbacks } = job;
    let node_id = command.node_id();

    match command {
        StackCommand::ReadAttribute { paths, .. } => {
            for item in read_items(shared, node_id, &paths, false) {
                callbacks.on_result(item);
            }
        }
        StackCommand::ReadEvent { paths, .. } => {
            for item in read_items(shared, node_id, &paths, true) {
                callbacks.on_result(item);
            }
        }
        StackCommand::WriteAttribute { paths, value, .. } => {
            for ack in write_items(shared, node_id, &paths, &value) {
                callbacks.on_result(ack);
            }
        }
        StackCommand::SubscribeAttribute { paths, .. } => {
            subscribe(shared, node_id, &paths, false, &callbacks);
        }
        StackCommand::SubscribeEvent { paths, .. } => {
            subscribe(shared, node_id, &paths, true, &callbacks);
        }
        StackCommand::InvokeCommand { path, payload, .. } => {
            let response = payload.map(Value::String).unwrap_or(Value::Null);
            callbacks.on_result(ResultItem::ok(path, response));
        }
        StackCommand::Pair(method) => {
            if pairing_pincode(&method) != Some(shared.setup_pincode) {
                warn!(node_id, method = method.name(), "Pairing rejected: pincode mismatch");
                callbacks.on_error("pairing failed: incorrect setup pincode");
            } else {
                shared.nodes.write().entry(node_id).or_insert_with(|| SimNode {
                    responsive: true,
                    ..SimNode::default()
                });
                info!(node_id, method = method.name(), "Node commissioned");
            }
        }
        StackCommand::OpenCommissioningWindow(window) => {
            callbacks.on_result(commissioning_window_item(shared, &window));
        }
    }

    if is_responsive(shared, node_id) {
        callbacks.on_done();
    } else {
        debug!(node_id, "Node unresponsive, completion withheld");
    }
}

/// Pincode offered by a pairing request; code payloads were parsed at issue
fn pairing_pincode(method: &PairingMethod) -> Option<u32> {
    match method {
        PairingMethod::Code { payload, .. } => {
            SetupPayload::parse(payload).ok().map(|setup| setup.pincode)
        }
        other => other.pincode(),
    }
}

fn is_responsive(shared: &Shared, node_id: NodeId) -> bool {
    shared
        .nodes
        .read()
        .get(&node_id)
        .map(|node| node.responsive)
        // A failed pairing leaves no node behind but still completes
        .unwrap_or(true)
}

fn read_items(shared: &Shared, node_id: NodeId, paths: &PathSet, events: bool) -> Vec<ResultItem> {
    let nodes = shared.nodes.read();
    let Some(node) = nodes.get(&node_id) else {
        return Vec::new();
    };
    let (store, missing) = if events {
        (&node.events, status::UNSUPPORTED_EVENT)
    } else {
        (&node.attributes, status::UNSUPPORTED_ATTRIBUTE)
    };
    paths
        .expand()
        .into_iter()
        .map(|path| match store.get(&path) {
            Some(value) => ResultItem::ok(path, value.clone()),
            None => ResultItem::failed(path, missing),
        })
        .collect()
}

/// Store `value` at each existing path and acknowledge every path
fn write_items(shared: &Shared, node_id: NodeId, paths: &PathSet, value: &Value) -> Vec<ResultItem> {
    let mut nodes = shared.nodes.write();
    let Some(node) = nodes.get_mut(&node_id) else {
        return Vec::new();
    };
    paths
        .expand()
        .into_iter()
        .map(|path| match node.attributes.get_mut(&path) {
            Some(stored) => {
                *stored = value.clone();
                ResultItem::ok(path, Value::Null)
            }
            None => ResultItem::failed(path, status::UNSUPPORTED_WRITE),
        })
        .collect()
}

fn subscribe(
    shared: &Shared,
    node_id: NodeId,
    paths: &PathSet,
    events: bool,
    callbacks: &CallbackHandle,
) {
    // Priming report
    for item in read_items(shared, node_id, paths, events) {
        callbacks.on_result(item);
    }
    let subscription_id = shared.next_subscription_id.fetch_add(1, Ordering::Relaxed);
    shared
        .subscriptions
        .lock()
        .entry(node_id)
        .or_default()
        .insert(subscription_id);
    callbacks.on_subscription_established(subscription_id);
    debug!(node_id, subscription_id, "Subscription established");
}

/// Result item carrying the manual pairing code for the opened window
fn commissioning_window_item(shared: &Shared, window: &CommissioningWindow) -> ResultItem {
    let command = if window.enhanced {
        OPEN_COMMISSIONING_WINDOW
    } else {
        OPEN_BASIC_COMMISSIONING_WINDOW
    };
    let path = ItemPath::new(0, ADMIN_COMMISSIONING_CLUSTER, command);
    let code = encode_manual(window.discriminator, shared.setup_pincode);
    ResultItem::ok(path, Value::String(code))
}
