//! Correlation registry and per-operation accumulators
//!
//! The registry maps an [`OperationKey`] to the [`PendingOperation`] that
//! accumulates results for it. One lock guards the whole map and every
//! mutation of a registered operation, so a callback can never touch an
//! operation while the coordinator is reclaiming it. The lock is only held
//! for the map access itself, never across an await.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mbridge_core::{NodeId, ResultItem, MAX_PATHS};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::debug;

/// Identifies one in-flight operation.
///
/// `tag` is 0 when operations are keyed per node; otherwise it is a
/// process-unique request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OperationKey {
    pub node_id: NodeId,
    pub tag: u64,
}

impl OperationKey {
    /// Key allowing a single in-flight operation per node
    pub fn node(node_id: NodeId) -> Self {
        Self { node_id, tag: 0 }
    }

    /// Key for one request among several against the same node
    pub fn request(node_id: NodeId, request_id: u64) -> Self {
        Self {
            node_id,
            tag: request_id,
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag == 0 {
            write!(f, "0x{:016X}", self.node_id)
        } else {
            write!(f, "0x{:016X}#{}", self.node_id, self.tag)
        }
    }
}

/// A key plus the generation of the registration it was issued for.
///
/// Callbacks carry a token rather than a bare key, so a late callback from
/// an abandoned operation cannot land in a newer operation on the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub key: OperationKey,
    pub generation: u64,
}

/// Completion state of a pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Success,
    PartialFailure,
}

/// Accumulator for one in-flight operation.
///
/// Owned by the registry from registration until reclamation.
#[derive(Debug)]
pub struct PendingOperation {
    generation: u64,
    expected: usize,
    received: usize,
    failed_items: usize,
    results: Vec<ResultItem>,
    status: OperationStatus,
    error_detail: Option<String>,
    subscription_id: Option<u32>,
    completion: Option<oneshot::Sender<OperationStatus>>,
}

/// Receiving half of an operation's single-fire completion signal
#[derive(Debug)]
pub struct CompletionWaiter {
    rx: oneshot::Receiver<OperationStatus>,
}

impl CompletionWaiter {
    /// Wait for the completion signal, at most `timeout`.
    ///
    /// Returns `None` when the deadline elapses first.
    pub async fn wait(self, timeout: Duration) -> Option<OperationStatus> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(status)) => Some(status),
            // Sender gone without firing: the entry was reclaimed elsewhere
            Ok(Err(_)) => None,
            Err(_) => None,
        }
    }
}

impl PendingOperation {
    /// Create an operation expecting `expected` result items.
    ///
    /// Zero is valid: the operation then completes on the done signal alone.
    pub fn new(expected: usize) -> (Self, CompletionWaiter) {
        let (tx, rx) = oneshot::channel();
        let op = Self {
            generation: 0,
            expected,
            received: 0,
            failed_items: 0,
            results: Vec::with_capacity(expected.min(MAX_PATHS)),
            status: OperationStatus::Pending,
            error_detail: None,
            subscription_id: None,
            completion: Some(tx),
        };
        (op, CompletionWaiter { rx })
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn results(&self) -> &[ResultItem] {
        &self.results
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Whether the completion signal has already been posted
    pub fn is_signalled(&self) -> bool {
        self.completion.is_none()
    }

    /// Append a result item. Items arriving after the completion signal are
    /// dropped, since the status they would change is already latched.
    pub(crate) fn push_result(&mut self, item: ResultItem) -> bool {
        if self.is_signalled() {
            return false;
        }
        if !item.is_success() {
            self.failed_items += 1;
        }
        self.results.push(item);
        self.received += 1;
        true
    }

    /// Record an error detail; ignored once the completion signal is posted
    pub(crate) fn record_error(&mut self, detail: String) -> bool {
        if self.is_signalled() {
            return false;
        }
        match &mut self.error_detail {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(&detail);
            }
            None => self.error_detail = Some(detail),
        }
        true
    }

    pub(crate) fn set_subscription_id(&mut self, subscription_id: u32) {
        self.subscription_id = Some(subscription_id);
    }

    fn has_error(&self) -> bool {
        self.error_detail.is_some() || self.failed_items > 0
    }

    /// Set the final status and post the completion signal.
    ///
    /// Returns false if the signal had already been posted.
    pub(crate) fn complete(&mut self) -> bool {
        let Some(tx) = self.completion.take() else {
            return false;
        };
        self.status = if self.has_error() {
            OperationStatus::PartialFailure
        } else {
            OperationStatus::Success
        };
        if self.failed_items > 0 && self.error_detail.is_none() {
            self.error_detail = Some(format!(
                "{} of {} items reported non-zero status",
                self.failed_items, self.received
            ));
        }
        // The waiter may have timed out and dropped its receiver
        let _ = tx.send(self.status);
        true
    }

    /// Consume the operation into its harvestable results
    pub fn into_harvest(self) -> Harvest {
        Harvest {
            results: self.results,
            expected: self.expected,
            received: self.received,
            subscription_id: self.subscription_id,
            error_detail: self.error_detail,
        }
    }
}

/// Results retrieved from a reclaimed operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Harvest {
    pub results: Vec<ResultItem>,
    pub expected: usize,
    pub received: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Harvest {
    /// Diagnostic only: the stack delivered a different number of items
    /// than anticipated
    pub fn count_mismatch(&self) -> bool {
        self.received != self.expected
    }
}

/// Registration failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Operation already in flight for {0}")]
    Conflict(OperationKey),
}

/// Keyed table of in-flight operations
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    entries: Mutex<HashMap<OperationKey, PendingOperation>>,
    next_generation: AtomicU64,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `operation` under `key`.
    ///
    /// Fails with `Conflict` if the key is already active; the existing
    /// entry is left untouched. The returned [`Registration`] reclaims the
    /// entry when harvested or dropped.
    pub fn register(
        self: &Arc<Self>,
        key: OperationKey,
        mut operation: PendingOperation,
    ) -> Result<Registration, RegistryError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        operation.generation = generation;

        {
            let mut entries = self.entries.lock();
            if entries.contains_key(&key) {
                return Err(RegistryError::Conflict(key));
            }
            entries.insert(key, operation);
        }

        debug!(key = %key, generation, "Operation registered");
        Ok(Registration {
            registry: Arc::clone(self),
            token: Token { key, generation },
            reclaimed: false,
        })
    }

    /// Run `f` on the operation registered for `token`, under the registry
    /// lock.
    ///
    /// Returns `None` without calling `f` if the key is not registered or is
    /// registered for a different generation.
    pub fn lookup<R>(&self, token: Token, f: impl FnOnce(&mut PendingOperation) -> R) -> Option<R> {
        let mut entries = self.entries.lock();
        entries
            .get_mut(&token.key)
            .filter(|op| op.generation == token.generation)
            .map(f)
    }

    /// Detach and return the operation registered for `token`.
    ///
    /// After this, lookups for the token find nothing.
    pub fn remove(&self, token: Token) -> Option<PendingOperation> {
        let mut entries = self.entries.lock();
        match entries.get(&token.key) {
            Some(op) if op.generation == token.generation => entries.remove(&token.key),
            _ => None,
        }
    }

    /// Whether any operation is registered for `key`
    pub fn contains(&self, key: &OperationKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of operations in flight
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Ownership of one registry entry.
///
/// The entry is removed exactly once: by [`Registration::harvest`], or when
/// the registration is dropped on any other exit path (early return, panic,
/// or cancellation of the awaiting future).
#[derive(Debug)]
#[must_use = "dropping the registration reclaims the operation immediately"]
pub struct Registration {
    registry: Arc<CorrelationRegistry>,
    token: Token,
    reclaimed: bool,
}

impl Registration {
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn key(&self) -> OperationKey {
        self.token.key
    }

    /// Remove the entry and return whatever it accumulated
    pub fn harvest(mut self) -> Harvest {
        self.reclaimed = true;
        self.registry
            .remove(self.token)
            .map(PendingOperation::into_harvest)
            .unwrap_or_default()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.reclaimed && self.registry.remove(self.token).is_some() {
            debug!(key = %self.token.key, "Operation reclaimed without harvest");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbridge_core::{status, ItemPath, Value};

    fn item(id: u32) -> ResultItem {
        ResultItem::ok(ItemPath::new(1, 6, id), Value::Unsigned(id as u64))
    }

    #[test]
    fn test_register_conflict_leaves_first_untouched() {
        let registry = Arc::new(CorrelationRegistry::new());
        let key = OperationKey::node(0x42);

        let (op, _waiter) = PendingOperation::new(3);
        let first = registry.register(key, op).unwrap();
        registry.lookup(first.token(), |op| op.push_result(item(1)));

        let (op, _waiter2) = PendingOperation::new(1);
        let err = registry.register(key, op).unwrap_err();
        assert_eq!(err, RegistryError::Conflict(key));

        let harvest = first.harvest();
        assert_eq!(harvest.expected, 3);
        assert_eq!(harvest.results, vec![item(1)]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_distinct_request_keys_coexist() {
        let registry = Arc::new(CorrelationRegistry::new());
        let (a, _wa) = PendingOperation::new(1);
        let (b, _wb) = PendingOperation::new(1);
        let _ra = registry.register(OperationKey::request(7, 1), a).unwrap();
        let _rb = registry.register(OperationKey::request(7, 2), b).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_drop_reclaims_entry() {
        let registry = Arc::new(CorrelationRegistry::new());
        let key = OperationKey::node(1);
        let (op, _waiter) = PendingOperation::new(0);
        let registration = registry.register(key, op).unwrap();
        let token = registration.token();
        assert!(registry.contains(&key));

        drop(registration);
        assert!(!registry.contains(&key));
        assert!(registry.lookup(token, |_| ()).is_none());
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let registry = Arc::new(CorrelationRegistry::new());
        let key = OperationKey::node(9);

        let (op, _w1) = PendingOperation::new(1);
        let old = registry.register(key, op).unwrap();
        let stale = old.token();
        drop(old);

        let (op, _w2) = PendingOperation::new(1);
        let current = registry.register(key, op).unwrap();
        assert_ne!(current.token(), stale);

        assert!(registry.lookup(stale, |op| op.push_result(item(5))).is_none());
        assert!(registry.remove(stale).is_none());
        assert!(registry.contains(&key));
        assert!(current.harvest().results.is_empty());
    }

    #[test]
    fn test_complete_fires_once() {
        let (mut op, _waiter) = PendingOperation::new(1);
        op.push_result(item(1));
        assert!(op.complete());
        assert!(!op.complete());
        assert_eq!(op.status(), OperationStatus::Success);
        assert!(op.is_signalled());
    }

    #[test]
    fn test_failed_item_flags_partial_failure() {
        let (mut op, _waiter) = PendingOperation::new(2);
        op.push_result(item(1));
        op.push_result(ResultItem::failed(
            ItemPath::new(1, 6, 2),
            status::UNSUPPORTED_ATTRIBUTE,
        ));
        op.complete();
        assert_eq!(op.status(), OperationStatus::PartialFailure);
        assert_eq!(
            op.error_detail(),
            Some("1 of 2 items reported non-zero status")
        );
    }

    #[test]
    fn test_errors_accumulate() {
        let (mut op, _waiter) = PendingOperation::new(0);
        op.record_error("first".to_string());
        op.record_error("second".to_string());
        op.complete();
        assert_eq!(op.error_detail(), Some("first; second"));
        assert_eq!(op.status(), OperationStatus::PartialFailure);
    }

    #[test]
    fn test_count_mismatch_is_diagnostic() {
        let (mut op, _waiter) = PendingOperation::new(1);
        op.push_result(item(1));
        op.push_result(item(2));
        op.complete();
        let harvest = op.into_harvest();
        assert!(harvest.count_mismatch());
        assert_eq!(harvest.received, 2);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(OperationKey::node(0x12).to_string(), "0x0000000000000012");
        assert_eq!(
            OperationKey::request(0x12, 4).to_string(),
            "0x0000000000000012#4"
        );
    }
}
