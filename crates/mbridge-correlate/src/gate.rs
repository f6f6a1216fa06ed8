//! Process-wide serialization gate for the device stack
//!
//! The underlying stack is not safe for concurrent invocation, so every call
//! into it happens while holding the single [`StackGate`]. Acquisition is
//! bounded by a caller-supplied timeout; release happens when the returned
//! [`GateGuard`] is dropped, so every successful acquisition is paired with
//! exactly one release on every exit path.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Single mutual-exclusion gate guarding the device stack
#[derive(Debug, Default)]
pub struct StackGate {
    lock: Mutex<()>,
}

/// Proof of gate ownership. Dropping it releases the gate.
#[derive(Debug)]
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl StackGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive ownership, waiting at most `timeout`.
    ///
    /// `None` waits without bound. Returns `None` if the gate could not be
    /// taken in time; nothing is held in that case.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Option<GateGuard<'_>> {
        let guard = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.lock.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "Stack gate busy");
                    return None;
                }
            },
            None => self.lock.lock().await,
        };
        debug!("Stack gate acquired");
        Some(GateGuard { _guard: guard })
    }

    /// Take the gate only if it is free right now
    pub fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.lock
            .try_lock()
            .ok()
            .map(|guard| GateGuard { _guard: guard })
    }

    /// Whether some caller currently holds the gate
    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
