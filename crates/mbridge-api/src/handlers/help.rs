//! API self-description

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub path: &'static str,
    pub method: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HelpResponse {
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Vec<EndpointInfo>,
}

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("/api/pairing", "POST", "Pair a device to the controller"),
    ("/api/open-commissioning-window", "POST", "Open commissioning window on a device"),
    ("/api/invoke-command", "POST", "Invoke cluster command on a device"),
    ("/api/read-attribute", "POST", "Read device attributes"),
    ("/api/write-attribute", "POST", "Write device attributes"),
    ("/api/read-event", "POST", "Read device events"),
    ("/api/subscribe-attribute", "POST", "Subscribe to device attributes"),
    ("/api/subscribe-event", "POST", "Subscribe to device events"),
    ("/api/shutdown-subscription", "POST", "Shutdown specific subscription"),
    ("/api/shutdown-all-subscriptions", "POST", "Shutdown all subscriptions"),
    ("/api/subscriptions", "GET", "List subscriptions established through this bridge"),
    ("/api/group-settings", "POST", "Manage controller groups"),
];

/// GET /api/help
pub async fn help() -> Json<HelpResponse> {
    Json(HelpResponse {
        version: env!("CARGO_PKG_VERSION"),
        description: "Device controller REST API",
        endpoints: ENDPOINTS
            .iter()
            .map(|&(path, method, description)| EndpointInfo {
                path,
                method,
                description,
            })
            .collect(),
    })
}
