//! Correlation and stack configuration
//!
//! These sections are embedded in the daemon's TOML file as
//! `[correlation]` and `[stack]`.

use std::time::Duration;

use mbridge_core::{NodeId, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::Timeouts;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{kind}: completion_timeout_ms must be greater than zero")]
    ZeroCompletionTimeout { kind: &'static str },

    #[error(
        "{kind}: completion_timeout_ms ({completion_ms}) must exceed gate_timeout_ms ({gate_ms})"
    )]
    CompletionNotAfterGate {
        kind: &'static str,
        gate_ms: u64,
        completion_ms: u64,
    },

    #[error("Duplicate simulated node {0:#x}")]
    DuplicateNode(NodeId),

    #[error("Invalid value for {path}: {reason}")]
    InvalidValue { path: String, reason: String },
}

// =============================================================================
// Correlation
// =============================================================================

/// How operation keys are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// One in-flight operation per node; a second one is rejected
    #[default]
    PerNode,
    /// Each request gets its own key, so a node may have several in flight
    PerRequest,
}

/// Gate and completion bounds for one operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTimeouts {
    /// Absent means wait for the gate without bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_timeout_ms: Option<u64>,
    pub completion_timeout_ms: u64,
}

impl OperationTimeouts {
    pub const fn new(gate_timeout_ms: Option<u64>, completion_timeout_ms: u64) -> Self {
        Self {
            gate_timeout_ms,
            completion_timeout_ms,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::new(
            self.gate_timeout_ms.map(Duration::from_millis),
            Duration::from_millis(self.completion_timeout_ms),
        )
    }

    pub fn gate_timeout(&self) -> Option<Duration> {
        self.gate_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self, kind: &'static str) -> Result<(), ConfigError> {
        if self.completion_timeout_ms == 0 {
            return Err(ConfigError::ZeroCompletionTimeout { kind });
        }
        if let Some(gate_ms) = self.gate_timeout_ms {
            if self.completion_timeout_ms <= gate_ms {
                return Err(ConfigError::CompletionNotAfterGate {
                    kind,
                    gate_ms,
                    completion_ms: self.completion_timeout_ms,
                });
            }
        }
        Ok(())
    }
}

fn default_read_timeouts() -> OperationTimeouts {
    OperationTimeouts::new(Some(2000), 10_000)
}

fn default_read_event_timeouts() -> OperationTimeouts {
    OperationTimeouts::new(None, 10_000)
}

fn default_subscribe_timeouts() -> OperationTimeouts {
    OperationTimeouts::new(None, 15_000)
}

fn default_commissioning_timeouts() -> OperationTimeouts {
    OperationTimeouts::new(None, 60_000)
}

fn default_shutdown_timeouts() -> OperationTimeouts {
    OperationTimeouts::new(None, 10_000)
}

/// `[correlation]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default)]
    pub key_policy: KeyPolicy,
    #[serde(default = "default_read_timeouts")]
    pub read_attribute: OperationTimeouts,
    #[serde(default = "default_read_timeouts")]
    pub write_attribute: OperationTimeouts,
    #[serde(default = "default_read_event_timeouts")]
    pub read_event: OperationTimeouts,
    #[serde(default = "default_subscribe_timeouts")]
    pub subscribe: OperationTimeouts,
    #[serde(default = "default_read_timeouts")]
    pub invoke_command: OperationTimeouts,
    #[serde(default = "default_commissioning_timeouts")]
    pub commissioning: OperationTimeouts,
    /// Only the gate bound applies; shutdowns are not correlated
    #[serde(default = "default_shutdown_timeouts")]
    pub shutdown: OperationTimeouts,
    /// Immediate like shutdowns; only the gate bound applies
    #[serde(default = "default_shutdown_timeouts")]
    pub group_settings: OperationTimeouts,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            key_policy: KeyPolicy::default(),
            read_attribute: default_read_timeouts(),
            write_attribute: default_read_timeouts(),
            read_event: default_read_event_timeouts(),
            subscribe: default_subscribe_timeouts(),
            invoke_command: default_read_timeouts(),
            commissioning: default_commissioning_timeouts(),
            shutdown: default_shutdown_timeouts(),
            group_settings: default_shutdown_timeouts(),
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.read_attribute.validate("read_attribute")?;
        self.write_attribute.validate("write_attribute")?;
        self.read_event.validate("read_event")?;
        self.subscribe.validate("subscribe")?;
        self.invoke_command.validate("invoke_command")?;
        self.commissioning.validate("commissioning")?;
        self.shutdown.validate("shutdown")?;
        self.group_settings.validate("group_settings")
    }
}

// =============================================================================
// Stack
// =============================================================================

/// `[stack]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StackConfig {
    /// In-process simulated devices
    Simulated(SimulatedConfig),
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::Simulated(SimulatedConfig::default())
    }
}

impl StackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StackConfig::Simulated(cfg) => cfg.validate(),
        }
    }
}

/// Simulated stack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// Delay before each delivery job runs
    #[serde(default)]
    pub latency_ms: u64,
    /// Pincode a pairing request must present
    #[serde(default = "default_setup_pincode")]
    pub setup_pincode: u32,
    #[serde(default)]
    pub nodes: Vec<SimulatedNodeConfig>,
}

fn default_setup_pincode() -> u32 {
    20202021
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            setup_pincode: default_setup_pincode(),
            nodes: Vec::new(),
        }
    }
}

impl SimulatedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.node_id) {
                return Err(ConfigError::DuplicateNode(node.node_id));
            }
            for item in node.attributes.iter().chain(node.events.iter()) {
                item.value()?;
            }
        }
        Ok(())
    }

    /// A single lighting node, used when the daemon runs without a config file
    pub fn demo() -> Self {
        let attr = |cluster, attribute, value: serde_json::Value| SimulatedItemConfig {
            endpoint: 1,
            cluster,
            id: attribute,
            value,
        };
        Self {
            latency_ms: 20,
            setup_pincode: default_setup_pincode(),
            nodes: vec![SimulatedNodeConfig {
                node_id: 0x1,
                responsive: true,
                attributes: vec![
                    // OnOff
                    attr(0x0006, 0x0000, serde_json::json!(false)),
                    // LevelControl CurrentLevel
                    attr(0x0008, 0x0000, serde_json::json!(128)),
                    // BasicInformation VendorName
                    SimulatedItemConfig {
                        endpoint: 0,
                        cluster: 0x0028,
                        id: 0x0001,
                        value: serde_json::json!("mbridge"),
                    },
                ],
                events: vec![SimulatedItemConfig {
                    endpoint: 0,
                    cluster: 0x0028,
                    // StartUp
                    id: 0x0000,
                    value: serde_json::json!({"software_version": 1}),
                }],
            }],
        }
    }
}

/// One simulated node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedNodeConfig {
    pub node_id: NodeId,
    /// A non-responsive node accepts commands but never completes them
    #[serde(default = "default_responsive")]
    pub responsive: bool,
    #[serde(default)]
    pub attributes: Vec<SimulatedItemConfig>,
    #[serde(default)]
    pub events: Vec<SimulatedItemConfig>,
}

fn default_responsive() -> bool {
    true
}

/// A stored attribute value or the payload of a recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedItemConfig {
    pub endpoint: u16,
    pub cluster: u32,
    #[serde(alias = "attribute", alias = "event")]
    pub id: u32,
    pub value: serde_json::Value,
}

impl SimulatedItemConfig {
    /// Decode the configured value.
    ///
    /// Objects other than the tagged and `{"bytes": ...}` forms are kept as
    /// their JSON text, which is how structured event payloads are stored.
    pub fn value(&self) -> Result<Value, ConfigError> {
        match Value::try_from(&self.value) {
            Ok(value) => Ok(value),
            Err(_) if self.value.is_object() => Ok(Value::String(self.value.to_string())),
            Err(reason) => Err(ConfigError::InvalidValue {
                path: format!("{}/{:#x}/{:#x}", self.endpoint, self.cluster, self.id),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_correlation_defaults() {
        let config: CorrelationConfig = toml::from_str("").unwrap();
        assert_eq!(config, CorrelationConfig::default());
        assert_eq!(config.key_policy, KeyPolicy::PerNode);
        assert_eq!(config.read_attribute.gate_timeout_ms, Some(2000));
        assert_eq!(config.subscribe.gate_timeout_ms, None);
        assert_eq!(config.commissioning.completion_timeout_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_correlation_overrides() {
        let config: CorrelationConfig = toml::from_str(
            r#"
            key_policy = "per_request"

            [read_attribute]
            gate_timeout_ms = 500
            completion_timeout_ms = 3000

            [read_event]
            completion_timeout_ms = 4000
            "#,
        )
        .unwrap();

        assert_eq!(config.key_policy, KeyPolicy::PerRequest);
        assert_eq!(
            config.read_attribute.timeouts(),
            Timeouts::new(Some(Duration::from_millis(500)), Duration::from_secs(3))
        );
        assert_eq!(config.read_event.timeouts().gate, None);
        assert_eq!(config.write_attribute, default_read_timeouts());
    }

    #[test]
    fn test_completion_must_exceed_gate() {
        let mut config = CorrelationConfig::default();
        config.invoke_command = OperationTimeouts::new(Some(2000), 2000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CompletionNotAfterGate {
                kind: "invoke_command",
                ..
            })
        ));

        config.invoke_command = OperationTimeouts::new(None, 0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroCompletionTimeout { .. })
        ));
    }

    #[test]
    fn test_simulated_stack_config() {
        let config: StackConfig = toml::from_str(
            r#"
            type = "simulated"
            latency_ms = 5

            [[nodes]]
            node_id = 0x10

            [[nodes.attributes]]
            endpoint = 1
            cluster = 6
            attribute = 0
            value = true

            [[nodes.events]]
            endpoint = 0
            cluster = 0x28
            event = 0
            value = "boot"

            [[nodes]]
            node_id = 0x11
            responsive = false
            "#,
        )
        .unwrap();

        let StackConfig::Simulated(sim) = &config;
        assert_eq!(sim.latency_ms, 5);
        assert_eq!(sim.setup_pincode, 20202021);
        assert_eq!(sim.nodes.len(), 2);
        assert!(sim.nodes[0].responsive);
        assert!(!sim.nodes[1].responsive);
        assert_eq!(sim.nodes[0].attributes[0].value().unwrap(), Value::Bool(true));
        assert_eq!(sim.nodes[0].events[0].id, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_nodes_rejected() {
        let mut sim = SimulatedConfig::demo();
        sim.nodes.push(sim.nodes[0].clone());
        assert!(matches!(sim.validate(), Err(ConfigError::DuplicateNode(0x1))));
    }

    #[test]
    fn test_array_values_rejected() {
        let item = SimulatedItemConfig {
            endpoint: 1,
            cluster: 6,
            id: 0,
            value: serde_json::json!([1, 2]),
        };
        assert!(matches!(item.value(), Err(ConfigError::InvalidValue { .. })));
    }
}
