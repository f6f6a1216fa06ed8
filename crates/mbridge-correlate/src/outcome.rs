//! Typed result of a correlated operation

use std::fmt;
use std::time::Duration;

use mbridge_core::StackError;

use crate::registry::{Harvest, OperationKey};

/// Terminal result of [`RequestCoordinator::perform`](crate::RequestCoordinator::perform).
///
/// None of these are fatal; the caller maps them to its own response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Completion observed and no error was flagged
    Success(Harvest),
    /// Completion observed but the stack flagged an error for some item
    PartialFailure { harvest: Harvest, detail: String },
    /// Completion not observed in time; carries whatever had arrived
    Timeout { harvest: Harvest, waited: Duration },
    /// The stack gate could not be acquired in time
    Busy { waited: Duration },
    /// The stack rejected the command when it was issued
    DispatchFailed(StackError),
    /// Another operation for the same key is in flight
    Conflict(OperationKey),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Results gathered, for the outcomes that carry any
    pub fn harvest(&self) -> Option<&Harvest> {
        match self {
            Outcome::Success(harvest)
            | Outcome::PartialFailure { harvest, .. }
            | Outcome::Timeout { harvest, .. } => Some(harvest),
            _ => None,
        }
    }

    pub fn into_harvest(self) -> Option<Harvest> {
        match self {
            Outcome::Success(harvest)
            | Outcome::PartialFailure { harvest, .. }
            | Outcome::Timeout { harvest, .. } => Some(harvest),
            _ => None,
        }
    }

    /// Short machine-readable name
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::PartialFailure { .. } => "partial_failure",
            Outcome::Timeout { .. } => "timeout",
            Outcome::Busy { .. } => "busy",
            Outcome::DispatchFailed(_) => "dispatch_failed",
            Outcome::Conflict(_) => "conflict",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(harvest) => write!(f, "completed with {} results", harvest.received),
            Outcome::PartialFailure { detail, .. } => write!(f, "completed with errors: {}", detail),
            Outcome::Timeout { harvest, waited } => write!(
                f,
                "no completion after {} ms ({} of {} results received)",
                waited.as_millis(),
                harvest.received,
                harvest.expected
            ),
            Outcome::Busy { waited } => write!(
                f,
                "device stack busy - gate not acquired within {} ms",
                waited.as_millis()
            ),
            Outcome::DispatchFailed(err) => write!(f, "command rejected: {}", err),
            Outcome::Conflict(key) => write!(f, "operation already in flight for {}", key),
        }
    }
}
