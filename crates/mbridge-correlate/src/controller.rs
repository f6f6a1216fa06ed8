//! Typed façade over the coordinator, one method per operation kind

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mbridge_core::{
    CommissioningWindow, GroupAction, GroupInfo, ItemPath, NodeId, PairingMethod, PathSet,
    StackCommand, StackError, Value,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{CorrelationConfig, KeyPolicy, OperationTimeouts};
use crate::coordinator::RequestCoordinator;
use crate::outcome::Outcome;
use crate::registry::OperationKey;
use crate::stack::DeviceStack;
use crate::subscription::{SubscriptionInfo, SubscriptionKind, SubscriptionTracker};

/// Failures of the immediate (uncorrelated) subscription shutdown calls
#[derive(Debug, Error, PartialEq)]
pub enum ShutdownError {
    #[error("Device stack busy, gave up after {}ms", .waited.as_millis())]
    Busy { waited: Duration },

    #[error("Subscription 0x{subscription_id:08X} not found on node 0x{node_id:016X}")]
    NotFound { node_id: NodeId, subscription_id: u32 },

    #[error(transparent)]
    Stack(StackError),
}

/// Failures of the immediate group-settings call
#[derive(Debug, Error, PartialEq)]
pub enum GroupSettingsError {
    #[error("Device stack busy, gave up after {}ms", .waited.as_millis())]
    Busy { waited: Duration },

    #[error(transparent)]
    Stack(StackError),
}

/// Issues device operations and waits for their outcome
pub struct DeviceController {
    stack: Arc<dyn DeviceStack>,
    coordinator: RequestCoordinator,
    config: CorrelationConfig,
    subscriptions: SubscriptionTracker,
    next_request: AtomicU64,
}

impl DeviceController {
    pub fn new(stack: Arc<dyn DeviceStack>, config: CorrelationConfig) -> Self {
        Self {
            stack,
            coordinator: RequestCoordinator::new(),
            config,
            subscriptions: SubscriptionTracker::new(),
            next_request: AtomicU64::new(1),
        }
    }

    pub fn stack_name(&self) -> &str {
        self.stack.name()
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Subscriptions established through this controller and not shut down
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions.list()
    }

    pub async fn read_attribute(&self, node_id: NodeId, paths: PathSet) -> Outcome {
        let command = StackCommand::ReadAttribute { node_id, paths };
        self.execute(command, self.config.read_attribute).await
    }

    pub async fn write_attribute(
        &self,
        node_id: NodeId,
        paths: PathSet,
        value: Value,
        timed_timeout_ms: Option<u16>,
    ) -> Outcome {
        let command = StackCommand::WriteAttribute {
            node_id,
            paths,
            value,
            timed_timeout_ms,
        };
        self.execute(command, self.config.write_attribute).await
    }

    pub async fn read_event(&self, node_id: NodeId, paths: PathSet) -> Outcome {
        let command = StackCommand::ReadEvent { node_id, paths };
        self.execute(command, self.config.read_event).await
    }

    pub async fn subscribe_attribute(
        &self,
        node_id: NodeId,
        paths: PathSet,
        min_interval_s: u16,
        max_interval_s: u16,
    ) -> Outcome {
        let command = StackCommand::SubscribeAttribute {
            node_id,
            paths: paths.clone(),
            min_interval_s,
            max_interval_s,
        };
        let outcome = self.execute(command, self.config.subscribe).await;
        let info = SubscriptionInfo {
            node_id,
            subscription_id: 0,
            kind: SubscriptionKind::Attribute,
            paths,
            min_interval_s,
            max_interval_s,
        };
        self.track_subscription(&outcome, info);
        outcome
    }

    pub async fn subscribe_event(
        &self,
        node_id: NodeId,
        paths: PathSet,
        min_interval_s: u16,
        max_interval_s: u16,
    ) -> Outcome {
        let command = StackCommand::SubscribeEvent {
            node_id,
            paths: paths.clone(),
            min_interval_s,
            max_interval_s,
        };
        let outcome = self.execute(command, self.config.subscribe).await;
        let info = SubscriptionInfo {
            node_id,
            subscription_id: 0,
            kind: SubscriptionKind::Event,
            paths,
            min_interval_s,
            max_interval_s,
        };
        self.track_subscription(&outcome, info);
        outcome
    }

    pub async fn invoke_command(
        &self,
        node_id: NodeId,
        path: ItemPath,
        payload: Option<String>,
        timed_timeout_ms: Option<u16>,
    ) -> Outcome {
        let command = StackCommand::InvokeCommand {
            node_id,
            path,
            payload,
            timed_timeout_ms,
        };
        self.execute(command, self.config.invoke_command).await
    }

    pub async fn pair(&self, method: PairingMethod) -> Outcome {
        self.execute(StackCommand::Pair(method), self.config.commissioning)
            .await
    }

    pub async fn open_commissioning_window(&self, window: CommissioningWindow) -> Outcome {
        self.execute(
            StackCommand::OpenCommissioningWindow(window),
            self.config.commissioning,
        )
        .await
    }

    pub async fn shutdown_subscription(
        &self,
        node_id: NodeId,
        subscription_id: u32,
    ) -> Result<(), ShutdownError> {
        let gate_timeout = self.config.shutdown.gate_timeout();
        let result = self
            .coordinator
            .run_exclusive(gate_timeout, || {
                self.stack.shutdown_subscription(node_id, subscription_id)
            })
            .await
            .ok_or(ShutdownError::Busy {
                waited: gate_timeout.unwrap_or_default(),
            })?;

        match result {
            Ok(()) => {
                self.subscriptions.remove(node_id, subscription_id);
                info!(node_id = %format!("0x{:X}", node_id), subscription_id, "Subscription shut down");
                Ok(())
            }
            Err(StackError::SubscriptionNotFound { .. }) => Err(ShutdownError::NotFound {
                node_id,
                subscription_id,
            }),
            Err(e) => Err(ShutdownError::Stack(e)),
        }
    }

    /// Shut down every subscription, or only those of `node_id`.
    ///
    /// Returns how many tracked subscriptions were dropped.
    pub async fn shutdown_all_subscriptions(
        &self,
        node_id: Option<NodeId>,
    ) -> Result<usize, ShutdownError> {
        let gate_timeout = self.config.shutdown.gate_timeout();
        self.coordinator
            .run_exclusive(gate_timeout, || self.stack.shutdown_subscriptions(node_id))
            .await
            .ok_or(ShutdownError::Busy {
                waited: gate_timeout.unwrap_or_default(),
            })?
            .map_err(ShutdownError::Stack)?;

        let dropped = self.subscriptions.clear(node_id);
        info!(?node_id, dropped, "Subscriptions shut down");
        Ok(dropped)
    }

    /// Apply a group-settings action and return the resulting group table
    pub async fn group_settings(
        &self,
        action: GroupAction,
    ) -> Result<Vec<GroupInfo>, GroupSettingsError> {
        let gate_timeout = self.config.group_settings.gate_timeout();
        let name = action.name();
        let groups = self
            .coordinator
            .run_exclusive(gate_timeout, || self.stack.group_settings(action))
            .await
            .ok_or(GroupSettingsError::Busy {
                waited: gate_timeout.unwrap_or_default(),
            })?
            .map_err(GroupSettingsError::Stack)?;

        debug!(action = name, groups = groups.len(), "Group settings applied");
        Ok(groups)
    }

    fn key_for(&self, node_id: NodeId) -> OperationKey {
        match self.config.key_policy {
            KeyPolicy::PerNode => OperationKey::node(node_id),
            KeyPolicy::PerRequest => {
                OperationKey::request(node_id, self.next_request.fetch_add(1, Ordering::Relaxed))
            }
        }
    }

    async fn execute(&self, command: StackCommand, timeouts: OperationTimeouts) -> Outcome {
        let key = self.key_for(command.node_id());
        let expected = command.expected_count();
        debug!(command = command.name(), key = %key, expected, "Executing");
        self.coordinator
            .perform(key, expected, timeouts.timeouts(), |callbacks| {
                self.stack.issue(command, callbacks)
            })
            .await
    }

    fn track_subscription(&self, outcome: &Outcome, mut info: SubscriptionInfo) {
        let established = match outcome {
            Outcome::Success(harvest) | Outcome::PartialFailure { harvest, .. } => {
                harvest.subscription_id
            }
            _ => None,
        };
        if let Some(subscription_id) = established {
            info.subscription_id = subscription_id;
            info!(
                node_id = %format!("0x{:X}", info.node_id),
                subscription_id,
                kind = ?info.kind,
                "Subscription established"
            );
            self.subscriptions.record(info);
        }
    }
}

impl std::fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceController")
            .field("stack", &self.stack.name())
            .field("key_policy", &self.config.key_policy)
            .field("in_flight", &self.coordinator.registry().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimulatedConfig, SimulatedItemConfig, SimulatedNodeConfig};
    use crate::stack::SimulatedStack;
    use pretty_assertions::assert_eq;

    const LIGHT: NodeId = 0x10;
    const SLEEPY: NodeId = 0x20;

    fn stack() -> Arc<SimulatedStack> {
        let node = |node_id, responsive| SimulatedNodeConfig {
            node_id,
            responsive,
            attributes: vec![SimulatedItemConfig {
                endpoint: 1,
                cluster: 0x0006,
                id: 0x0000,
                value: serde_json::json!(true),
            }],
            events: vec![],
        };
        let config = SimulatedConfig {
            latency_ms: 5,
            setup_pincode: 20202021,
            nodes: vec![node(LIGHT, true), node(SLEEPY, false)],
        };
        Arc::new(SimulatedStack::new(&config).unwrap())
    }

    fn fast_config(key_policy: KeyPolicy) -> CorrelationConfig {
        let timeouts = OperationTimeouts::new(Some(200), 300);
        CorrelationConfig {
            key_policy,
            read_attribute: timeouts,
            write_attribute: timeouts,
            read_event: timeouts,
            subscribe: timeouts,
            invoke_command: timeouts,
            commissioning: timeouts,
            shutdown: OperationTimeouts::new(Some(50), 300),
            group_settings: OperationTimeouts::new(Some(50), 300),
        }
    }

    fn on_off() -> PathSet {
        PathSet::single(ItemPath::new(1, 0x0006, 0x0000))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_read_and_write() {
        let stack = stack();
        let controller = DeviceController::new(stack.clone(), fast_config(KeyPolicy::PerNode));

        let write = controller
            .write_attribute(LIGHT, on_off(), Value::Bool(false), Some(500))
            .await;
        assert!(write.is_success());

        let read = controller.read_attribute(LIGHT, on_off()).await;
        let harvest = read.into_harvest().unwrap();
        assert_eq!(harvest.results[0].payload, Value::Bool(false));
        assert!(controller.coordinator().registry().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_per_node_policy_rejects_second_operation() {
        let controller = Arc::new(DeviceController::new(
            stack(),
            fast_config(KeyPolicy::PerNode),
        ));

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.read_attribute(SLEEPY, on_off()).await })
        };
        while controller.coordinator().registry().is_empty() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let second = controller.read_attribute(SLEEPY, on_off()).await;
        assert_eq!(second, Outcome::Conflict(OperationKey::node(SLEEPY)));
        assert_eq!(first.await.unwrap().kind(), "timeout");
        assert!(controller.coordinator().registry().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_per_request_policy_allows_concurrency() {
        let controller = Arc::new(DeviceController::new(
            stack(),
            fast_config(KeyPolicy::PerRequest),
        ));

        let (a, b) = tokio::join!(
            controller.read_attribute(LIGHT, on_off()),
            controller.invoke_command(LIGHT, ItemPath::new(1, 0x0006, 0x02), None, None),
        );
        assert!(a.is_success());
        assert!(b.is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subscriptions_are_tracked() {
        let stack = stack();
        let controller = DeviceController::new(stack.clone(), fast_config(KeyPolicy::PerNode));

        let outcome = controller.subscribe_attribute(LIGHT, on_off(), 1, 10).await;
        let subscription_id = outcome.harvest().and_then(|h| h.subscription_id).unwrap();

        let tracked = controller.subscriptions();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].subscription_id, subscription_id);
        assert_eq!(tracked[0].kind, SubscriptionKind::Attribute);

        controller
            .shutdown_subscription(LIGHT, subscription_id)
            .await
            .unwrap();
        assert!(controller.subscriptions().is_empty());
        assert_eq!(stack.subscription_count(), 0);

        assert_eq!(
            controller.shutdown_subscription(LIGHT, subscription_id).await,
            Err(ShutdownError::NotFound {
                node_id: LIGHT,
                subscription_id
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_all_for_one_node() {
        let stack = stack();
        let controller = DeviceController::new(stack.clone(), fast_config(KeyPolicy::PerNode));

        controller.subscribe_attribute(LIGHT, on_off(), 0, 5).await;
        controller.subscribe_event(LIGHT, on_off(), 0, 5).await;
        assert_eq!(controller.subscriptions().len(), 2);

        assert_eq!(controller.shutdown_all_subscriptions(Some(0x99)).await, Ok(0));
        assert_eq!(controller.shutdown_all_subscriptions(Some(LIGHT)).await, Ok(2));
        assert_eq!(stack.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_reports_busy_gate() {
        let controller = DeviceController::new(stack(), fast_config(KeyPolicy::PerNode));
        let _held = controller.coordinator().gate().try_acquire().unwrap();

        assert_eq!(
            controller.shutdown_all_subscriptions(None).await,
            Err(ShutdownError::Busy {
                waited: Duration::from_millis(50)
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pair_then_read_new_node() {
        let controller = DeviceController::new(stack(), fast_config(KeyPolicy::PerNode));

        let paired = controller
            .pair(PairingMethod::BleWifi {
                node_id: 0x30,
                ssid: "lab".to_string(),
                password: "secret".to_string(),
                pincode: 20202021,
                discriminator: 3840,
            })
            .await;
        assert!(paired.is_success());

        // Freshly commissioned nodes expose no attributes yet
        let read = controller.read_attribute(0x30, on_off()).await;
        assert_eq!(read.kind(), "partial_failure");
    }
}
