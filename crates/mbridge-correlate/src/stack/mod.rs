//! Device stack collaborator
//!
//! A device stack accepts commands synchronously and reports their results
//! later, from a delivery context of its own, through a [`CallbackHandle`].
//! It is not safe for concurrent invocation; every call into it must be made
//! while holding the [`StackGate`](crate::gate::StackGate).
//!
//! - Simulated stack with configurable nodes, for demos and tests

pub mod setup_code;
pub mod simulated;

pub use setup_code::SetupPayload;
pub use simulated::SimulatedStack;

use std::sync::Arc;

use mbridge_core::{GroupAction, GroupInfo, NodeId, StackCommand, StackResult};

use crate::config::StackConfig;
use crate::dispatcher::CallbackHandle;

/// The asynchronous device-control stack
pub trait DeviceStack: Send + Sync {
    /// Stack name for logs
    fn name(&self) -> &str;

    /// Issue a command. Returns once the stack has accepted or rejected it;
    /// results arrive later through `callbacks`.
    fn issue(&self, command: StackCommand, callbacks: CallbackHandle) -> StackResult<()>;

    /// Tear down one subscription
    fn shutdown_subscription(&self, node_id: NodeId, subscription_id: u32) -> StackResult<()>;

    /// Tear down every subscription, or only those of one node
    fn shutdown_subscriptions(&self, node_id: Option<NodeId>) -> StackResult<()>;

    /// Edit or list the controller's group table; returns the table after
    /// the action
    fn group_settings(&self, action: GroupAction) -> StackResult<Vec<GroupInfo>>;
}

/// Create a device stack based on configuration
pub fn create_stack(config: &StackConfig) -> StackResult<Arc<dyn DeviceStack>> {
    match config {
        StackConfig::Simulated(cfg) => {
            let stack = SimulatedStack::new(cfg)?;
            Ok(Arc::new(stack))
        }
    }
}
