//! Subscription teardown and listing

use axum::extract::State;
use axum::Json;
use mbridge_correlate::SubscriptionInfo;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::parse::parse_id;
use crate::response::ApiJson;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShutdownSubscriptionRequest {
    pub node_id: String,
    pub subscription_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShutdownAllRequest {
    /// Restrict the shutdown to one node
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionListResponse {
    pub items: Vec<SubscriptionInfo>,
}

/// POST /api/shutdown-subscription
pub async fn shutdown_subscription(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ShutdownSubscriptionRequest>,
) -> Result<Json<ShutdownResponse>, ApiError> {
    let node_id = parse_id("node_id", &request.node_id)?;
    let subscription_id = parse_id("subscription_id", &request.subscription_id)?;

    state
        .controller()
        .shutdown_subscription(node_id, subscription_id)
        .await?;

    Ok(Json(ShutdownResponse {
        status: "success".to_string(),
        message: "Subscription shutdown successfully".to_string(),
    }))
}

/// POST /api/shutdown-all-subscriptions
pub async fn shutdown_all_subscriptions(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ShutdownAllRequest>,
) -> Result<Json<ShutdownResponse>, ApiError> {
    let node_id = request
        .node_id
        .as_deref()
        .map(|raw| parse_id("node_id", raw))
        .transpose()?;

    let dropped = state.controller().shutdown_all_subscriptions(node_id).await?;

    Ok(Json(ShutdownResponse {
        status: "success".to_string(),
        message: format!("All subscriptions shutdown successfully ({} tracked)", dropped),
    }))
}

/// GET /api/subscriptions
pub async fn list_subscriptions(State(state): State<AppState>) -> Json<SubscriptionListResponse> {
    Json(SubscriptionListResponse {
        items: state.controller().subscriptions(),
    })
}
