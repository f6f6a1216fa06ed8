//! Callback entry points for the device stack's delivery context
//!
//! Everything here may run on a thread the coordinator does not control.
//! Each callback looks the operation up by token; an absent entry (never
//! registered, or already reclaimed after a timeout) is a silent no-op.
//! The dispatcher never removes entries; only the coordinator that created
//! an entry reclaims it.

use std::sync::Arc;

use mbridge_core::ResultItem;
use tracing::{debug, trace};

use crate::registry::{CorrelationRegistry, OperationKey, Token};

/// Routes asynchronously delivered results to pending operations
#[derive(Debug)]
pub struct CallbackDispatcher {
    registry: Arc<CorrelationRegistry>,
}

impl CallbackDispatcher {
    pub fn new(registry: Arc<CorrelationRegistry>) -> Self {
        Self { registry }
    }

    /// Append one result item. Returns whether an operation received it.
    pub fn on_result(&self, token: Token, item: ResultItem) -> bool {
        let path = item.path;
        let received = self
            .registry
            .lookup(token, |op| op.push_result(item).then(|| op.received()));
        match received {
            Some(Some(received)) => {
                trace!(key = %token.key, %path, received, "Result appended");
                true
            }
            Some(None) => {
                debug!(key = %token.key, %path, "Result after completion dropped");
                false
            }
            None => {
                debug!(key = %token.key, %path, "Result for inactive operation dropped");
                false
            }
        }
    }

    /// Record a stack-reported error without completing the operation
    pub fn on_error(&self, token: Token, detail: impl Into<String>) -> bool {
        let detail = detail.into();
        let delivered = self
            .registry
            .lookup(token, |op| op.record_error(detail.clone()))
            .unwrap_or(false);
        if delivered {
            debug!(key = %token.key, %detail, "Operation error recorded");
        } else {
            debug!(key = %token.key, %detail, "Error for inactive or completed operation dropped");
        }
        delivered
    }

    /// Record the id of a subscription the operation established
    pub fn on_subscription_established(&self, token: Token, subscription_id: u32) -> bool {
        self.registry
            .lookup(token, |op| op.set_subscription_id(subscription_id))
            .is_some()
    }

    /// Final notification: set the outcome and post the completion signal.
    ///
    /// The signal is posted at most once; repeated calls return false.
    pub fn on_done(&self, token: Token) -> bool {
        match self.registry.lookup(token, |op| op.complete()) {
            Some(true) => {
                debug!(key = %token.key, "Operation completion signalled");
                true
            }
            Some(false) => {
                debug!(key = %token.key, "Duplicate completion ignored");
                false
            }
            None => {
                debug!(key = %token.key, "Completion for inactive operation dropped");
                false
            }
        }
    }
}

/// Callbacks for one issued operation, handed to the device stack.
///
/// Cheap to clone and safe to move to any thread.
#[derive(Debug, Clone)]
pub struct CallbackHandle {
    token: Token,
    dispatcher: Arc<CallbackDispatcher>,
}

impl CallbackHandle {
    pub fn new(token: Token, dispatcher: Arc<CallbackDispatcher>) -> Self {
        Self { token, dispatcher }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn key(&self) -> OperationKey {
        self.token.key
    }

    pub fn on_result(&self, item: ResultItem) -> bool {
        self.dispatcher.on_result(self.token, item)
    }

    pub fn on_error(&self, detail: impl Into<String>) -> bool {
        self.dispatcher.on_error(self.token, detail)
    }

    pub fn on_subscription_established(&self, subscription_id: u32) -> bool {
        self.dispatcher
            .on_subscription_established(self.token, subscription_id)
    }

    pub fn on_done(&self) -> bool {
        self.dispatcher.on_done(self.token)
    }
}
