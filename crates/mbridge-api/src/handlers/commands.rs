//! Cluster command invocation

use axum::extract::State;
use axum::response::Response;
use mbridge_core::ItemPath;
use serde::Deserialize;

use crate::error::ApiError;
use crate::parse::{nonzero, parse_id};
use crate::response::{outcome_response, ApiJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InvokeCommandRequest {
    pub node_id: String,
    pub endpoint_id: String,
    pub cluster_id: String,
    pub command_id: String,
    /// Command fields as JSON text, passed through to the stack
    #[serde(default)]
    pub command_data: Option<String>,
    #[serde(default)]
    pub timed_invoke_timeout_ms: Option<u16>,
}

/// POST /api/invoke-command
pub async fn invoke_command(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<InvokeCommandRequest>,
) -> Result<Response, ApiError> {
    let node_id = parse_id("node_id", &request.node_id)?;
    let path = ItemPath::new(
        parse_id("endpoint_id", &request.endpoint_id)?,
        parse_id("cluster_id", &request.cluster_id)?,
        parse_id("command_id", &request.command_id)?,
    );

    let outcome = state
        .controller()
        .invoke_command(
            node_id,
            path,
            request.command_data,
            nonzero(request.timed_invoke_timeout_ms),
        )
        .await;
    outcome_response("Invoke command", node_id, outcome)
}
