//! Event read and subscribe handlers

use axum::extract::State;
use axum::response::Response;
use mbridge_core::{NodeId, PathSet};
use serde::Deserialize;

use crate::error::ApiError;
use crate::parse::{parse_id, parse_id_list};
use crate::response::{outcome_response, ApiJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventPathRequest {
    pub node_id: String,
    pub endpoint_ids: String,
    pub cluster_ids: String,
    pub event_ids: String,
}

impl EventPathRequest {
    fn parse(&self) -> Result<(NodeId, PathSet), ApiError> {
        let node_id = parse_id("node_id", &self.node_id)?;
        let paths = PathSet::new(
            parse_id_list("endpoint_ids", &self.endpoint_ids)?,
            parse_id_list("cluster_ids", &self.cluster_ids)?,
            parse_id_list("event_ids", &self.event_ids)?,
        );
        paths.check_bounds()?;
        Ok((node_id, paths))
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscribeEventRequest {
    #[serde(flatten)]
    pub target: EventPathRequest,
    pub min_interval: String,
    pub max_interval: String,
}

/// POST /api/read-event
pub async fn read_event(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EventPathRequest>,
) -> Result<Response, ApiError> {
    let (node_id, paths) = request.parse()?;
    let outcome = state.controller().read_event(node_id, paths).await;
    outcome_response("Read event", node_id, outcome)
}

/// POST /api/subscribe-event
pub async fn subscribe_event(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SubscribeEventRequest>,
) -> Result<Response, ApiError> {
    let (node_id, paths) = request.target.parse()?;
    let min_interval = parse_id("min_interval", &request.min_interval)?;
    let max_interval = parse_id("max_interval", &request.max_interval)?;

    let outcome = state
        .controller()
        .subscribe_event(node_id, paths, min_interval, max_interval)
        .await;
    outcome_response("Subscribe event", node_id, outcome)
}
