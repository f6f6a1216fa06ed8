//! Typed commands handed to a device stack

use super::{ItemPath, NodeId, PathSet, Value};

/// How a device is commissioned onto the fabric
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingMethod {
    /// Device already on the IP network
    OnNetwork { node_id: NodeId, pincode: u32 },
    /// BLE rendezvous, then Wi-Fi provisioning
    BleWifi {
        node_id: NodeId,
        ssid: String,
        password: String,
        pincode: u32,
        discriminator: u16,
    },
    /// BLE rendezvous, then Thread provisioning with an operational dataset
    BleThread {
        node_id: NodeId,
        dataset: Vec<u8>,
        pincode: u32,
        discriminator: u16,
    },
    /// Onboarding payload: manual pairing code or `MT:` QR string
    Code { node_id: NodeId, payload: String },
}

impl PairingMethod {
    pub fn node_id(&self) -> NodeId {
        match self {
            PairingMethod::OnNetwork { node_id, .. }
            | PairingMethod::BleWifi { node_id, .. }
            | PairingMethod::BleThread { node_id, .. }
            | PairingMethod::Code { node_id, .. } => *node_id,
        }
    }

    /// Explicit setup pincode; code pairing carries it inside the payload
    pub fn pincode(&self) -> Option<u32> {
        match self {
            PairingMethod::OnNetwork { pincode, .. }
            | PairingMethod::BleWifi { pincode, .. }
            | PairingMethod::BleThread { pincode, .. } => Some(*pincode),
            PairingMethod::Code { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PairingMethod::OnNetwork { .. } => "onnetwork",
            PairingMethod::BleWifi { .. } => "ble-wifi",
            PairingMethod::BleThread { .. } => "ble-thread",
            PairingMethod::Code { .. } => "code",
        }
    }
}

/// Parameters for opening a commissioning window on an existing node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissioningWindow {
    pub node_id: NodeId,
    /// Enhanced (passcode-based) window instead of the basic one
    pub enhanced: bool,
    pub window_timeout_s: u16,
    pub iterations: u32,
    pub discriminator: u16,
}

/// A command issued to the device stack.
///
/// Every command targets one node and produces zero or more result items
/// followed by exactly one completion notification.
#[derive(Debug, Clone, PartialEq)]
pub enum StackCommand {
    ReadAttribute {
        node_id: NodeId,
        paths: PathSet,
    },
    WriteAttribute {
        node_id: NodeId,
        paths: PathSet,
        value: Value,
        timed_timeout_ms: Option<u16>,
    },
    ReadEvent {
        node_id: NodeId,
        paths: PathSet,
    },
    SubscribeAttribute {
        node_id: NodeId,
        paths: PathSet,
        min_interval_s: u16,
        max_interval_s: u16,
    },
    SubscribeEvent {
        node_id: NodeId,
        paths: PathSet,
        min_interval_s: u16,
        max_interval_s: u16,
    },
    InvokeCommand {
        node_id: NodeId,
        path: ItemPath,
        /// Command fields, encoded by the stack
        payload: Option<String>,
        timed_timeout_ms: Option<u16>,
    },
    Pair(PairingMethod),
    OpenCommissioningWindow(CommissioningWindow),
}

impl StackCommand {
    /// Node addressed by this command
    pub fn node_id(&self) -> NodeId {
        match self {
            StackCommand::ReadAttribute { node_id, .. }
            | StackCommand::WriteAttribute { node_id, .. }
            | StackCommand::ReadEvent { node_id, .. }
            | StackCommand::SubscribeAttribute { node_id, .. }
            | StackCommand::SubscribeEvent { node_id, .. }
            | StackCommand::InvokeCommand { node_id, .. } => *node_id,
            StackCommand::Pair(method) => method.node_id(),
            StackCommand::OpenCommissioningWindow(window) => window.node_id,
        }
    }

    /// Number of result items anticipated; advisory only
    pub fn expected_count(&self) -> usize {
        match self {
            StackCommand::ReadAttribute { paths, .. }
            | StackCommand::WriteAttribute { paths, .. }
            | StackCommand::ReadEvent { paths, .. }
            | StackCommand::SubscribeAttribute { paths, .. }
            | StackCommand::SubscribeEvent { paths, .. } => paths.len(),
            StackCommand::InvokeCommand { .. } => 1,
            StackCommand::Pair(_) => 0,
            StackCommand::OpenCommissioningWindow(_) => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StackCommand::ReadAttribute { .. } => "read-attribute",
            StackCommand::WriteAttribute { .. } => "write-attribute",
            StackCommand::ReadEvent { .. } => "read-event",
            StackCommand::SubscribeAttribute { .. } => "subscribe-attribute",
            StackCommand::SubscribeEvent { .. } => "subscribe-event",
            StackCommand::InvokeCommand { .. } => "invoke-command",
            StackCommand::Pair(_) => "pairing",
            StackCommand::OpenCommissioningWindow(_) => "open-commissioning-window",
        }
    }
}
