//! Bookkeeping for subscriptions established through this bridge

use std::collections::HashMap;

use mbridge_core::{NodeId, PathSet};
use parking_lot::RwLock;
use serde::Serialize;

/// What a subscription reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    Attribute,
    Event,
}

/// A live subscription
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    pub node_id: NodeId,
    pub subscription_id: u32,
    pub kind: SubscriptionKind,
    pub paths: PathSet,
    pub min_interval_s: u16,
    pub max_interval_s: u16,
}

/// Tracks subscriptions keyed by (node, subscription id)
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    subscriptions: RwLock<HashMap<(NodeId, u32), SubscriptionInfo>>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, info: SubscriptionInfo) {
        self.subscriptions
            .write()
            .insert((info.node_id, info.subscription_id), info);
    }

    pub fn remove(&self, node_id: NodeId, subscription_id: u32) -> Option<SubscriptionInfo> {
        self.subscriptions.write().remove(&(node_id, subscription_id))
    }

    /// Forget every subscription, or those of one node. Returns how many
    /// were dropped.
    pub fn clear(&self, node_id: Option<NodeId>) -> usize {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        match node_id {
            Some(node_id) => subscriptions.retain(|(node, _), _| *node != node_id),
            None => subscriptions.clear(),
        }
        before - subscriptions.len()
    }

    /// Snapshot ordered by node, then subscription id
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut list: Vec<_> = self.subscriptions.read().values().cloned().collect();
        list.sort_by_key(|info| (info.node_id, info.subscription_id));
        list
    }

    pub fn count(&self) -> usize {
        self.subscriptions.read().len()
    }
}
