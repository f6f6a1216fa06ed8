//! HTTP integration tests against a simulated stack
//!
//! Each test starts the router on an ephemeral port and talks to it with
//! reqwest, so requests cross a real socket and handler tasks race the
//! stack's delivery thread as they do in the daemon.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mbridge_api::{create_router, AppState, OperationResponse};
use mbridge_correlate::{
    CorrelationConfig, DeviceController, OperationTimeouts, SimulatedConfig, SimulatedItemConfig,
    SimulatedNodeConfig, SimulatedStack,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const LIGHT: &str = "0x10";
const SLEEPY: &str = "0x20";

/// Router bound to 127.0.0.1:0, shut down on drop
struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    controller: Arc<DeviceController>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let node = |node_id, responsive| SimulatedNodeConfig {
            node_id,
            responsive,
            attributes: vec![
                SimulatedItemConfig {
                    endpoint: 1,
                    cluster: 0x0006,
                    id: 0x0000,
                    value: json!(true),
                },
                SimulatedItemConfig {
                    endpoint: 1,
                    cluster: 0x0008,
                    id: 0x0000,
                    value: json!(254),
                },
            ],
            events: vec![SimulatedItemConfig {
                endpoint: 0,
                cluster: 0x0028,
                id: 0x0000,
                value: json!("boot"),
            }],
        };
        let stack = SimulatedStack::new(&SimulatedConfig {
            latency_ms: 5,
            setup_pincode: 20202021,
            nodes: vec![node(0x10, true), node(0x20, false)],
        })
        .unwrap();

        let fast = OperationTimeouts::new(Some(100), 400);
        let config = CorrelationConfig {
            read_attribute: fast,
            write_attribute: fast,
            read_event: fast,
            invoke_command: fast,
            shutdown: OperationTimeouts::new(Some(100), 400),
            group_settings: OperationTimeouts::new(Some(100), 400),
            ..CorrelationConfig::default()
        };
        let controller = Arc::new(DeviceController::new(Arc::new(stack), config));
        let router = create_router(AppState::new(controller.clone()), true);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        Self {
            addr,
            client,
            controller,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("http://{}{}", self.addr, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(format!("http://{}{}", self.addr, path))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn read_on_off(node_id: &str) -> Value {
    json!({
        "node_id": node_id,
        "endpoint_ids": "1",
        "cluster_ids": "0x0006",
        "attribute_ids": "0"
    })
}

#[tokio::test]
async fn test_help_lists_endpoints() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/api/help").await;

    assert_eq!(status, 200);
    let paths: Vec<&str> = body["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert!(paths.contains(&"/api/read-attribute"));
    assert!(paths.contains(&"/api/shutdown-all-subscriptions"));
    assert!(paths.contains(&"/api/group-settings"));
}

#[tokio::test]
async fn test_read_attribute_returns_results_in_order() {
    let server = TestServer::start().await;
    let (status, body) = server
        .post(
            "/api/read-attribute",
            json!({
                "node_id": LIGHT,
                "endpoint_ids": "1",
                "cluster_ids": "6,8",
                "attribute_ids": "0"
            }),
        )
        .await;

    assert_eq!(status, 200);
    let response: OperationResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.status, "success");
    assert_eq!(response.expected, 2);
    assert_eq!(response.received, 2);
    assert_eq!(response.results[0].path.cluster_id, 0x0006);
    assert_eq!(response.results[1].path.cluster_id, 0x0008);
    assert_eq!(
        response.results[1].payload,
        mbridge_core::Value::Unsigned(254)
    );
    assert!(server.controller.coordinator().registry().is_empty());
}

#[tokio::test]
async fn test_write_then_read_back() {
    let server = TestServer::start().await;
    let mut write = read_on_off(LIGHT);
    write["attribute_value"] = json!(false);
    write["timed_write_timeout_ms"] = json!(1000);

    let (status, body) = server.post("/api/write-attribute", write).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["results"][0]["status"], 0);

    let (_, body) = server.post("/api/read-attribute", read_on_off(LIGHT)).await;
    assert_eq!(body["results"][0]["payload"], json!({"type": "bool", "value": false}));
}

#[tokio::test]
async fn test_unsupported_attribute_is_partial_failure() {
    let server = TestServer::start().await;
    let (status, body) = server
        .post(
            "/api/read-attribute",
            json!({
                "node_id": LIGHT,
                "endpoint_ids": "1",
                "cluster_ids": "6",
                "attribute_ids": "0,0x4000"
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "partial_failure");
    assert_eq!(body["results"][1]["status"], 0x86);
}

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let server = TestServer::start().await;
    let (status, body) = server.post("/api/read-attribute", read_on_off("0x99")).await;

    assert_eq!(status, 404);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_invalid_ids_are_bad_request() {
    let server = TestServer::start().await;
    let mut request = read_on_off(LIGHT);
    request["endpoint_ids"] = json!("1,,2");

    let (status, body) = server.post("/api/read-attribute", request).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_unresponsive_node_times_out_with_partial_results() {
    let server = TestServer::start().await;
    let (status, body) = server.post("/api/read-attribute", read_on_off(SLEEPY)).await;

    assert_eq!(status, 504);
    assert_eq!(body["status"], "timeout");
    assert_eq!(body["received"], 1);
    assert!(server.controller.coordinator().registry().is_empty());

    // The node can be addressed again once the timed-out operation is gone
    let (status, _) = server.post("/api/read-attribute", read_on_off(SLEEPY)).await;
    assert_eq!(status, 504);
}

#[tokio::test]
async fn test_second_operation_on_busy_node_conflicts() {
    let server = Arc::new(TestServer::start().await);

    let first = {
        let server = server.clone();
        tokio::spawn(async move { server.post("/api/read-attribute", read_on_off(SLEEPY)).await })
    };
    while server.controller.coordinator().registry().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (status, body) = server.post("/api/read-event", json!({
        "node_id": SLEEPY,
        "endpoint_ids": "0",
        "cluster_ids": "0x28",
        "event_ids": "0"
    }))
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "conflict");

    let (status, _) = first.await.unwrap();
    assert_eq!(status, 504);
}

#[tokio::test]
async fn test_held_gate_reports_busy() {
    let server = TestServer::start().await;
    let _held = server.controller.coordinator().gate().try_acquire().unwrap();

    let (status, body) = server.post("/api/read-attribute", read_on_off(LIGHT)).await;
    assert_eq!(status, 503);
    assert_eq!(body["error"], "service_unavailable");
    assert!(server.controller.coordinator().registry().is_empty());
}

#[tokio::test]
async fn test_subscription_roundtrip() {
    let server = TestServer::start().await;
    let mut request = read_on_off(LIGHT);
    request["min_interval"] = json!("1");
    request["max_interval"] = json!("30");

    let (status, body) = server.post("/api/subscribe-attribute", request).await;
    assert_eq!(status, 200, "{}", body);
    let subscription_id = body["subscription_id"].as_u64().unwrap();

    let (_, list) = server.get("/api/subscriptions").await;
    assert_eq!(list["items"].as_array().unwrap().len(), 1);
    assert_eq!(list["items"][0]["kind"], "attribute");

    let shutdown = json!({
        "node_id": LIGHT,
        "subscription_id": subscription_id.to_string()
    });
    let (status, body) = server.post("/api/shutdown-subscription", shutdown.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");

    let (status, _) = server.post("/api/shutdown-subscription", shutdown).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_shutdown_all_subscriptions() {
    let server = TestServer::start().await;
    let subscribe = json!({
        "node_id": LIGHT,
        "endpoint_ids": "0",
        "cluster_ids": "0x28",
        "event_ids": "0",
        "min_interval": "0",
        "max_interval": "10"
    });
    let (status, body) = server.post("/api/subscribe-event", subscribe).await;
    assert_eq!(status, 200, "{}", body);

    let (status, _) = server
        .post("/api/shutdown-all-subscriptions", json!({}))
        .await;
    assert_eq!(status, 200);

    let (_, list) = server.get("/api/subscriptions").await;
    assert!(list["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pairing_and_commissioning_window() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post(
            "/api/pairing",
            json!({"method": "onnetwork", "node_id": "0x30", "pincode": "1111"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "partial_failure");

    let (status, body) = server
        .post(
            "/api/pairing",
            json!({"method": "onnetwork", "node_id": "0x30", "pincode": "20202021"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");

    let (status, body) = server
        .post(
            "/api/open-commissioning-window",
            json!({
                "node_id": "0x30",
                "option": "1",
                "window_timeout": "300",
                "iteration": "1000",
                "discriminator": "3840"
            }),
        )
        .await;
    assert_eq!(status, 200);
    let code = body["results"][0]["payload"]["value"].as_str().unwrap();
    assert_eq!(code, "34970112332");

    // The issued code commissions another node
    let (status, body) = server
        .post(
            "/api/pairing",
            json!({"method": "code", "node_id": "0x31", "payload": code}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn test_group_settings() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post("/api/group-settings", json!({"action": "show-groups"}))
        .await;
    assert_eq!(status, 200);
    assert!(body["groups"].as_array().unwrap().is_empty());

    let (status, body) = server
        .post(
            "/api/group-settings",
            json!({"action": "add-group", "group_id": "0x0101", "group_name": "hall"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["groups"],
        json!([{"group_id": "0x0101", "group_name": "hall"}])
    );

    let (status, _) = server
        .post(
            "/api/group-settings",
            json!({"action": "add-group", "group_id": "0x0102"}),
        )
        .await;
    assert_eq!(status, 400);

    let (status, _) = server
        .post(
            "/api/group-settings",
            json!({"action": "remove-group", "group_id": "257"}),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = server
        .post(
            "/api/group-settings",
            json!({"action": "remove-group", "group_id": "257"}),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not_found");

    let (status, _) = server
        .post("/api/group-settings", json!({"action": "rename-group"}))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_group_settings_busy_gate() {
    let server = TestServer::start().await;
    let _held = server.controller.coordinator().gate().try_acquire().unwrap();

    let (status, body) = server
        .post("/api/group-settings", json!({"action": "show-groups"}))
        .await;
    assert_eq!(status, 503);
    assert_eq!(body["error"], "service_unavailable");
}

#[tokio::test]
async fn test_invoke_command_echoes_payload() {
    let server = TestServer::start().await;
    let (status, body) = server
        .post(
            "/api/invoke-command",
            json!({
                "node_id": LIGHT,
                "endpoint_id": "1",
                "cluster_id": "6",
                "command_id": "2",
                "command_data": "{}",
                "timed_invoke_timeout_ms": 0
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["received"], 1);
    assert_eq!(body["results"][0]["payload"]["value"], "{}");
}
