//! Pairing and commissioning-window handlers

use axum::extract::State;
use axum::response::Response;
use mbridge_core::{CommissioningWindow, PairingMethod};
use serde::Deserialize;

use crate::error::ApiError;
use crate::parse::{parse_hex, parse_id};
use crate::response::{outcome_response, ApiJson};
use crate::state::AppState;

/// Pairing request, selected by its `method` field
#[derive(Debug, Deserialize)]
#[serde(tag = "method")]
pub enum PairingRequest {
    #[serde(rename = "onnetwork")]
    OnNetwork { node_id: String, pincode: String },
    #[serde(rename = "ble-wifi")]
    BleWifi {
        node_id: String,
        ssid: String,
        password: String,
        pincode: String,
        discriminator: String,
    },
    #[serde(rename = "ble-thread")]
    BleThread {
        node_id: String,
        /// Operational dataset TLVs, hex encoded
        dataset: String,
        pincode: String,
        discriminator: String,
    },
    /// Manual pairing code or `MT:` QR payload
    #[serde(rename = "code")]
    Code { node_id: String, payload: String },
}

impl TryFrom<PairingRequest> for PairingMethod {
    type Error = ApiError;

    fn try_from(request: PairingRequest) -> Result<Self, Self::Error> {
        Ok(match request {
            PairingRequest::OnNetwork { node_id, pincode } => PairingMethod::OnNetwork {
                node_id: parse_id("node_id", &node_id)?,
                pincode: parse_id("pincode", &pincode)?,
            },
            PairingRequest::BleWifi {
                node_id,
                ssid,
                password,
                pincode,
                discriminator,
            } => PairingMethod::BleWifi {
                node_id: parse_id("node_id", &node_id)?,
                ssid,
                password,
                pincode: parse_id("pincode", &pincode)?,
                discriminator: parse_id("discriminator", &discriminator)?,
            },
            PairingRequest::BleThread {
                node_id,
                dataset,
                pincode,
                discriminator,
            } => {
                if dataset.trim().is_empty() {
                    return Err(ApiError::BadRequest("Empty dataset".to_string()));
                }
                PairingMethod::BleThread {
                    node_id: parse_id("node_id", &node_id)?,
                    dataset: parse_hex("dataset", &dataset)?,
                    pincode: parse_id("pincode", &pincode)?,
                    discriminator: parse_id("discriminator", &discriminator)?,
                }
            }
            PairingRequest::Code { node_id, payload } => {
                if payload.trim().is_empty() {
                    return Err(ApiError::BadRequest("Empty payload".to_string()));
                }
                PairingMethod::Code {
                    node_id: parse_id("node_id", &node_id)?,
                    payload,
                }
            }
        })
    }
}

/// POST /api/pairing
pub async fn pairing(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PairingRequest>,
) -> Result<Response, ApiError> {
    let method = PairingMethod::try_from(request)?;
    let node_id = method.node_id();
    tracing::info!(method = method.name(), node_id = %format!("0x{:X}", node_id), "Pairing requested");

    let outcome = state.controller().pair(method).await;
    outcome_response("Pairing", node_id, outcome)
}

#[derive(Debug, Deserialize)]
pub struct OpenCommissioningWindowRequest {
    pub node_id: String,
    /// "1" opens an enhanced window, anything else a basic one
    pub option: String,
    pub window_timeout: String,
    pub iteration: String,
    pub discriminator: String,
}

/// POST /api/open-commissioning-window
pub async fn open_commissioning_window(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<OpenCommissioningWindowRequest>,
) -> Result<Response, ApiError> {
    let option: u8 = parse_id("option", &request.option)?;
    let window = CommissioningWindow {
        node_id: parse_id("node_id", &request.node_id)?,
        enhanced: option == 1,
        window_timeout_s: parse_id("window_timeout", &request.window_timeout)?,
        iterations: parse_id("iteration", &request.iteration)?,
        discriminator: parse_id("discriminator", &request.discriminator)?,
    };
    let node_id = window.node_id;

    let outcome = state.controller().open_commissioning_window(window).await;
    outcome_response("Open commissioning window", node_id, outcome)
}
