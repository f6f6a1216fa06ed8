//! Errors reported synchronously by a device stack when a command is issued

use thiserror::Error;

/// Result type for immediate stack calls
pub type StackResult<T> = Result<T, StackError>;

/// Immediate rejection of a stack call.
///
/// These are returned by the issuing call itself, before any asynchronous
/// delivery takes place. Errors that occur later are reported through the
/// result callbacks instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// The command arguments failed validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The target node is not known to the stack (not commissioned)
    #[error("Unknown node: 0x{0:016X}")]
    UnknownNode(u64),

    /// No subscription with this id exists on the node
    #[error("Subscription 0x{subscription_id:08X} not found on node 0x{node_id:016X}")]
    SubscriptionNotFound { node_id: u64, subscription_id: u32 },

    /// No group with this id exists in the controller's group table
    #[error("Group 0x{0:04X} not found")]
    GroupNotFound(u16),

    /// The command is not supported by this stack
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Transport or session level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The stack has been shut down
    #[error("Device stack closed")]
    Closed,
}
