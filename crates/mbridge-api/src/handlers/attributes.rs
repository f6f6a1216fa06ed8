//! Attribute read, write and subscribe handlers

use axum::extract::State;
use axum::response::Response;
use mbridge_core::{NodeId, PathSet, Value};
use serde::Deserialize;

use crate::error::ApiError;
use crate::parse::{nonzero, parse_id, parse_id_list};
use crate::response::{outcome_response, ApiJson};
use crate::state::AppState;

/// Target of an attribute request
#[derive(Debug, Deserialize)]
pub struct AttributePathRequest {
    pub node_id: String,
    /// Comma-separated endpoint ids
    pub endpoint_ids: String,
    pub cluster_ids: String,
    pub attribute_ids: String,
}

impl AttributePathRequest {
    pub(crate) fn parse(&self) -> Result<(NodeId, PathSet), ApiError> {
        let node_id = parse_id("node_id", &self.node_id)?;
        let paths = PathSet::new(
            parse_id_list("endpoint_ids", &self.endpoint_ids)?,
            parse_id_list("cluster_ids", &self.cluster_ids)?,
            parse_id_list("attribute_ids", &self.attribute_ids)?,
        );
        paths.check_bounds()?;
        Ok((node_id, paths))
    }
}

#[derive(Debug, Deserialize)]
pub struct WriteAttributeRequest {
    #[serde(flatten)]
    pub target: AttributePathRequest,
    /// Plain JSON scalar, `{"bytes": "<hex>"}` or a tagged value
    pub attribute_value: serde_json::Value,
    #[serde(default)]
    pub timed_write_timeout_ms: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeAttributeRequest {
    #[serde(flatten)]
    pub target: AttributePathRequest,
    pub min_interval: String,
    pub max_interval: String,
}

/// POST /api/read-attribute
pub async fn read_attribute(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AttributePathRequest>,
) -> Result<Response, ApiError> {
    let (node_id, paths) = request.parse()?;
    let outcome = state.controller().read_attribute(node_id, paths).await;
    outcome_response("Read attribute", node_id, outcome)
}

/// POST /api/write-attribute
///
/// A positive `timed_write_timeout_ms` turns the write into a timed write.
pub async fn write_attribute(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<WriteAttributeRequest>,
) -> Result<Response, ApiError> {
    let (node_id, paths) = request.target.parse()?;
    let value = Value::try_from(&request.attribute_value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid attribute_value: {}", e)))?;

    let outcome = state
        .controller()
        .write_attribute(node_id, paths, value, nonzero(request.timed_write_timeout_ms))
        .await;
    outcome_response("Write attribute", node_id, outcome)
}

/// POST /api/subscribe-attribute
pub async fn subscribe_attribute(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SubscribeAttributeRequest>,
) -> Result<Response, ApiError> {
    let (node_id, paths) = request.target.parse()?;
    let min_interval = parse_id("min_interval", &request.min_interval)?;
    let max_interval = parse_id("max_interval", &request.max_interval)?;

    let outcome = state
        .controller()
        .subscribe_attribute(node_id, paths, min_interval, max_interval)
        .await;
    outcome_response("Subscribe attribute", node_id, outcome)
}
