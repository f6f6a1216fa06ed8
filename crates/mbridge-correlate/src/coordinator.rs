//! Request coordinator: the synchronous-looking façade over the stack
//!
//! One call to [`RequestCoordinator::perform`] walks an operation through
//!
//! ```text
//! Created ──▶ GateWait ──▶ Dispatched ──▶ Accumulating ──▶ Completed ──▶ Reclaimed
//!    │            │             │                            {Success,
//!    │            │             │                             PartialFailure,
//!    ▼            ▼             ▼                             Timeout}
//! Conflict      Busy      DispatchFailed
//! ```
//!
//! Reclamation is owned by the [`Registration`](crate::registry::Registration)
//! value, so it happens exactly once on every path out of `perform`,
//! including cancellation of the returned future.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mbridge_core::StackError;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{CallbackDispatcher, CallbackHandle};
use crate::gate::StackGate;
use crate::outcome::Outcome;
use crate::registry::{CorrelationRegistry, OperationKey, OperationStatus, PendingOperation};

/// Wait bounds for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on acquiring the stack gate; `None` waits indefinitely
    pub gate: Option<Duration>,
    /// Bound on waiting for the completion signal after dispatch
    pub completion: Duration,
}

impl Timeouts {
    pub fn new(gate: Option<Duration>, completion: Duration) -> Self {
        Self { gate, completion }
    }
}

/// Issues operations against the stack and waits for their results
#[derive(Debug, Clone)]
pub struct RequestCoordinator {
    gate: Arc<StackGate>,
    registry: Arc<CorrelationRegistry>,
    dispatcher: Arc<CallbackDispatcher>,
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::with_gate(Arc::new(StackGate::new()))
    }

    /// Create a coordinator sharing an existing gate
    pub fn with_gate(gate: Arc<StackGate>) -> Self {
        let registry = Arc::new(CorrelationRegistry::new());
        let dispatcher = Arc::new(CallbackDispatcher::new(registry.clone()));
        Self {
            gate,
            registry,
            dispatcher,
        }
    }

    pub fn gate(&self) -> &Arc<StackGate> {
        &self.gate
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<CallbackDispatcher> {
        &self.dispatcher
    }

    /// Run one correlated operation to completion.
    ///
    /// `issue` is called with the gate held and must hand the callbacks to
    /// the stack and return immediately with its accept/reject verdict.
    /// Results delivered through the callbacks are harvested once the stack
    /// signals completion or `timeouts.completion` elapses.
    pub async fn perform<F>(
        &self,
        key: OperationKey,
        expected: usize,
        timeouts: Timeouts,
        issue: F,
    ) -> Outcome
    where
        F: FnOnce(CallbackHandle) -> Result<(), StackError>,
    {
        // Created
        let (operation, waiter) = PendingOperation::new(expected);
        let registration = match self.registry.register(key, operation) {
            Ok(registration) => registration,
            Err(err) => {
                warn!(key = %key, "{}", err);
                return Outcome::Conflict(key);
            }
        };

        // GateWait
        let Some(guard) = self.gate.acquire(timeouts.gate).await else {
            // Nothing dispatched, so no callback can arrive; dropping the
            // registration reclaims the entry.
            return Outcome::Busy {
                waited: timeouts.gate.unwrap_or_default(),
            };
        };

        // Dispatched
        let callbacks = CallbackHandle::new(registration.token(), self.dispatcher.clone());
        let issued = issue(callbacks);
        drop(guard);
        if let Err(err) = issued {
            error!(key = %key, error = %err, "Stack rejected command");
            return Outcome::DispatchFailed(err);
        }
        debug!(key = %key, expected, "Command dispatched, awaiting completion");

        // Accumulating
        let started = Instant::now();
        let status = waiter.wait(timeouts.completion).await;

        // Completed -> Reclaimed
        let harvest = registration.harvest();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if harvest.count_mismatch() {
            debug!(
                key = %key,
                expected = harvest.expected,
                received = harvest.received,
                "Result count differs from expected"
            );
        }

        match status {
            Some(OperationStatus::Success) => {
                info!(key = %key, received = harvest.received, elapsed_ms, "Operation completed");
                Outcome::Success(harvest)
            }
            Some(_) => {
                let detail = harvest
                    .error_detail
                    .clone()
                    .unwrap_or_else(|| "device reported an error".to_string());
                warn!(key = %key, %detail, elapsed_ms, "Operation completed with errors");
                Outcome::PartialFailure { harvest, detail }
            }
            None => {
                warn!(
                    key = %key,
                    received = harvest.received,
                    expected = harvest.expected,
                    elapsed_ms,
                    "Operation timed out"
                );
                Outcome::Timeout {
                    harvest,
                    waited: timeouts.completion,
                }
            }
        }
    }

    /// Run an uncorrelated stack call under the gate.
    ///
    /// Returns `None` if the gate could not be acquired within `gate_timeout`.
    pub async fn run_exclusive<R>(
        &self,
        gate_timeout: Option<Duration>,
        call: impl FnOnce() -> R,
    ) -> Option<R> {
        let _guard = self.gate.acquire(gate_timeout).await?;
        Some(call())
    }
}
