//! mbridge-correlate - Async-to-sync correlation for a device-control stack
//!
//! The device stack accepts commands immediately and reports results later,
//! from a delivery context of its own. This crate lets a caller issue a
//! command and await its complete result set as one call:
//!
//! ```text
//!   caller task                      delivery context (stack thread)
//!   ───────────                      ───────────────────────────────
//!   RequestCoordinator::perform
//!     ├─ CorrelationRegistry::register(key)
//!     ├─ StackGate::acquire ─┐
//!     ├─ DeviceStack::issue  │ gate held
//!     ├─ release ────────────┘
//!     ├─ wait for completion ◀──────── CallbackDispatcher::on_done
//!     │                      ◀──────── CallbackDispatcher::on_result (xN)
//!     └─ Registration::harvest
//! ```
//!
//! [`DeviceController`] wraps the coordinator with one method per operation
//! kind, and [`stack::SimulatedStack`] is a bundled stack for demos and tests.

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod dispatcher;
pub mod gate;
pub mod outcome;
pub mod registry;
pub mod stack;
pub mod subscription;

pub use config::{
    ConfigError, CorrelationConfig, KeyPolicy, OperationTimeouts, SimulatedConfig,
    SimulatedItemConfig, SimulatedNodeConfig, StackConfig,
};
pub use controller::{DeviceController, GroupSettingsError, ShutdownError};
pub use coordinator::{RequestCoordinator, Timeouts};
pub use dispatcher::{CallbackDispatcher, CallbackHandle};
pub use gate::{GateGuard, StackGate};
pub use outcome::Outcome;
pub use registry::{
    CorrelationRegistry, Harvest, OperationKey, OperationStatus, PendingOperation, Registration,
    RegistryError, Token,
};
pub use stack::{create_stack, DeviceStack, SimulatedStack};
pub use subscription::{SubscriptionInfo, SubscriptionKind, SubscriptionTracker};
