//! mbridge-api - REST API over correlated device operations
//!
//! Each POST endpoint accepts a JSON body with string ids (decimal or `0x`
//! hex, lists comma-separated), issues one device operation through the
//! [`DeviceController`](mbridge_correlate::DeviceController) and answers once
//! the stack has delivered the complete result set, or a bound elapsed.
//!
//! # Usage
//!
//! ```ignore
//! use mbridge_api::{create_router, AppState};
//!
//! let controller = Arc::new(DeviceController::new(stack, config.correlation));
//! let router = create_router(AppState::new(controller), true);
//! ```

pub mod error;
pub mod handlers;
pub mod parse;
pub mod response;
pub mod state;

pub use error::ApiError;
pub use response::OperationResponse;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the REST API router with the given application state
pub fn create_router(state: AppState, cors_enable: bool) -> Router {
    let router = Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        .route("/api/help", get(handlers::help::help))
        // Commissioning
        .route("/api/pairing", post(handlers::commissioning::pairing))
        .route(
            "/api/open-commissioning-window",
            post(handlers::commissioning::open_commissioning_window),
        )
        // Interactions
        .route(
            "/api/invoke-command",
            post(handlers::commands::invoke_command),
        )
        .route(
            "/api/read-attribute",
            post(handlers::attributes::read_attribute),
        )
        .route(
            "/api/write-attribute",
            post(handlers::attributes::write_attribute),
        )
        .route("/api/read-event", post(handlers::events::read_event))
        .route(
            "/api/subscribe-attribute",
            post(handlers::attributes::subscribe_attribute),
        )
        .route(
            "/api/subscribe-event",
            post(handlers::events::subscribe_event),
        )
        // Subscription management
        .route(
            "/api/shutdown-subscription",
            post(handlers::subscriptions::shutdown_subscription),
        )
        .route(
            "/api/shutdown-all-subscriptions",
            post(handlers::subscriptions::shutdown_all_subscriptions),
        )
        .route(
            "/api/subscriptions",
            get(handlers::subscriptions::list_subscriptions),
        )
        // Controller configuration
        .route(
            "/api/group-settings",
            post(handlers::groups::group_settings),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enable {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}
