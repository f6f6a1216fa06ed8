//! Mapping of operation outcomes onto HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mbridge_core::{NodeId, ResultItem};
use mbridge_correlate::{Harvest, Outcome};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// JSON body (`Json<T>`) whose rejection is reported as a 400
#[derive(Debug, axum::extract::FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Body returned for a completed or timed-out operation
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    /// "success", "partial_failure" or "timeout"
    pub status: String,
    pub message: String,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub expected: usize,
    pub received: usize,
    pub results: Vec<ResultItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<u32>,
}

impl OperationResponse {
    fn new(status: &str, message: String, node_id: NodeId, harvest: Harvest) -> Self {
        Self {
            status: status.to_string(),
            message,
            node_id: format!("0x{:X}", node_id),
            detail: harvest.error_detail,
            expected: harvest.expected,
            received: harvest.received,
            results: harvest.results,
            subscription_id: harvest.subscription_id,
        }
    }
}

/// Convert an outcome into a response.
///
/// Timeouts still carry whatever results arrived, under a 504.
pub fn outcome_response(
    operation: &str,
    node_id: NodeId,
    outcome: Outcome,
) -> Result<Response, ApiError> {
    match outcome {
        Outcome::Success(harvest) => {
            let message = format!("{} completed", operation);
            let body = OperationResponse::new("success", message, node_id, harvest);
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        Outcome::PartialFailure { harvest, detail } => {
            let message = format!("{} completed with errors", operation);
            let mut body = OperationResponse::new("partial_failure", message, node_id, harvest);
            body.detail = Some(detail);
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        Outcome::Timeout { harvest, waited } => {
            tracing::warn!(
                operation,
                node_id = %format!("0x{:X}", node_id),
                waited_ms = waited.as_millis() as u64,
                received = harvest.received,
                "Operation timed out"
            );
            let message = format!(
                "{} timed out after {}ms",
                operation,
                waited.as_millis()
            );
            let body = OperationResponse::new("timeout", message, node_id, harvest);
            Ok((StatusCode::GATEWAY_TIMEOUT, Json(body)).into_response())
        }
        Outcome::Busy { waited } => Err(ApiError::ServiceUnavailable(format!(
            "Device stack busy - gave up after {}ms",
            waited.as_millis()
        ))),
        Outcome::Conflict(key) => Err(ApiError::Conflict(format!(
            "Another operation is already in flight for {}",
            key
        ))),
        Outcome::DispatchFailed(err) => Err(err.into()),
    }
}
