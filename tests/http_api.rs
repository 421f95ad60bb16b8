//! End-to-end tests for the wallet HTTP API.
//!
//! These start the real router on a random port with in-memory relay and
//! node doubles, then drive it over HTTP the way the CLI and the relay
//! bridge do. Relay events are posted with only what `init` handed a fake
//! bridge sidecar.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use walletbridge::broker::{BrokerSettings, NamespacePolicy, SessionBroker};
use walletbridge::config::ServerConfig;
use walletbridge::relay::{HttpRelayBridge, WalletMetadata};
use walletbridge::server::{router, start_server};
use walletbridge::testing::{RecordingRelay, RelayCall, ScriptedRpc};

const AUTH_TOKEN: &str = "test-token-12345";
const EVENTS_TOKEN: &str = "events-token-67890";
const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// What the wallet told the bridge sidecar during `init`.
struct BridgeRegistration {
    events_url: String,
    events_token: Option<String>,
}

struct TestServer {
    addr: SocketAddr,
    relay: Arc<RecordingRelay>,
    registration: BridgeRegistration,
    http: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(AUTH_TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(AUTH_TOKEN)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    /// Push a relay event the way the sidecar would after `init`.
    async fn push_event(&self, event: Value) -> StatusCode {
        let mut request = self.http.post(&self.registration.events_url).json(&event);
        if let Some(token) = &self.registration.events_token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap().status()
    }
}

fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.to_string().contains("Permission denied")
}

type InitBodies = Arc<Mutex<Vec<Value>>>;

async fn record_init(State(seen): State<InitBodies>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(body);
    Json(json!({ "ok": true }))
}

/// Serve a fake bridge sidecar that records `init` calls.
async fn spawn_sidecar() -> Option<(SocketAddr, InitBodies)> {
    let seen: InitBodies = Arc::default();
    let app = Router::new()
        .route("/init", post(record_init))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
    let addr = listener.local_addr().ok()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Some((addr, seen))
}

/// Start the API on a random port and register it with a fake sidecar.
/// `None` when the sandbox forbids binding.
async fn start_test_server() -> Option<TestServer> {
    let relay = Arc::new(RecordingRelay::new());
    let rpc = Arc::new(ScriptedRpc::new());
    let settings = BrokerSettings::new(NamespacePolicy::new("http://localhost:8545"));
    let (broker, _task) = SessionBroker::spawn(settings, relay.clone(), rpc);

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        base_url: "http://localhost:4000".to_string(),
        public_dir: None,
        api_token: Some(SecretString::from(AUTH_TOKEN.to_string())),
        events_token: Some(SecretString::from(EVENTS_TOKEN.to_string())),
    };
    let app = router(broker, &config);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let shutdown = async move {
        let _ = shutdown_rx.await;
    };
    let addr = match start_server(addr, app, shutdown).await {
        Ok((addr, _task)) => addr,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("Failed to start test server: {e}"),
    };

    let (sidecar, seen) = spawn_sidecar().await?;
    let bridge = HttpRelayBridge::new(format!("http://{sidecar}"), Duration::from_secs(5));
    let metadata = WalletMetadata {
        name: "Test Wallet".to_string(),
        description: "test".to_string(),
        url: "http://localhost:4000".to_string(),
        icons: vec![],
    };
    bridge
        .init(
            &SecretString::from("project-123".to_string()),
            &metadata,
            &format!("http://{addr}/relay/events"),
            config.events_token.as_ref(),
        )
        .await
        .unwrap();

    let init = seen.lock().unwrap()[0].clone();
    let registration = BridgeRegistration {
        events_url: init["eventsUrl"].as_str().unwrap().to_string(),
        events_token: init["eventsToken"].as_str().map(String::from),
    };

    Some(TestServer {
        addr,
        relay,
        registration,
        http: reqwest::Client::new(),
        _shutdown: shutdown_tx,
    })
}

fn proposal_event(id: u64) -> Value {
    json!({
        "type": "session_proposal",
        "event": {
            "id": id,
            "params": {
                "requiredNamespaces": {},
                "optionalNamespaces": {
                    "eip155": {
                        "chains": ["eip155:1"],
                        "methods": ["eth_sendTransaction", "personal_sign"],
                        "events": ["chainChanged", "accountsChanged"]
                    }
                },
                "relays": [{ "protocol": "irn" }],
                "proposer": { "metadata": { "name": "Demo dApp" } }
            }
        }
    })
}

fn sign_request_event(id: u64, topic: &str) -> Value {
    json!({
        "type": "session_request",
        "event": {
            "id": id,
            "topic": topic,
            "params": {
                "request": { "method": "personal_sign", "params": ["0x68656c6c6f"] },
                "chainId": "eip155:1"
            }
        }
    })
}

#[tokio::test]
async fn health_is_public_and_wallet_routes_need_the_token() {
    let Some(server) = start_test_server().await else {
        return;
    };

    let health = server
        .http
        .get(server.url("/api/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let denied = server
        .http
        .get(server.url("/wallet/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let wrong = server
        .http
        .post(server.url("/relay/events"))
        .bearer_auth("not-the-token")
        .json(&proposal_event(1))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bridge_reaches_relay_events_with_what_init_handed_it() {
    let Some(server) = start_test_server().await else {
        return;
    };
    assert_eq!(
        server.registration.events_token.as_deref(),
        Some(EVENTS_TOKEN)
    );

    let anonymous = server
        .http
        .post(&server.registration.events_url)
        .json(&proposal_event(3))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(server.push_event(proposal_event(3)).await, StatusCode::ACCEPTED);
    let (_, snapshot) = server.get("/wallet/status").await;
    assert_eq!(snapshot["pendingRequests"][0][0], "session_proposal");
    assert_eq!(snapshot["pendingRequests"][0][1]["id"], 3);
}

#[tokio::test]
async fn operator_flow_from_create_to_signed_request() {
    let Some(server) = start_test_server().await else {
        return;
    };

    let (status, created) = server
        .post("/wallet/create", json!({ "mnemonic": TEST_MNEMONIC }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        created["address"],
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
    );

    assert_eq!(server.push_event(proposal_event(1)).await, StatusCode::ACCEPTED);

    let (_, snapshot) = server.get("/wallet/status").await;
    assert_eq!(snapshot["pendingRequests"][0][0], "session_proposal");

    let (status, approved) = server.post("/wallet/approve-session", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["success"], true);
    let topic = approved["session"]["topic"].as_str().unwrap().to_string();
    assert_eq!(
        approved["session"]["namespaces"]["eip155"]["accounts"],
        json!(["eip155:1:0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"])
    );

    assert_eq!(
        server.push_event(sign_request_event(9, &topic)).await,
        StatusCode::ACCEPTED
    );

    let (status, signed) = server
        .post("/wallet/approve-request", json!({ "requestId": 9 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(signed["requestId"], 9);
    assert_eq!(signed["method"], "personal_sign");
    assert!(signed["result"].as_str().unwrap().starts_with("0x"));
    assert!(matches!(
        server.relay.calls().last(),
        Some(RelayCall::Respond { response, .. }) if response.id == 9
    ));

    let (_, snapshot) = server.get("/wallet/status").await;
    assert_eq!(snapshot["connected"], true);
    assert_eq!(snapshot["pendingRequests"], json!([]));
}

#[tokio::test]
async fn errors_map_to_statuses_with_codes() {
    let Some(server) = start_test_server().await else {
        return;
    };

    let (status, body) = server.post("/wallet/connect", json!({ "uri": "wc:abc@2" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "not_initialized");
    assert_eq!(body["error"], "Wallet not initialized");

    server
        .post("/wallet/create", json!({ "mnemonic": TEST_MNEMONIC }))
        .await;

    let (status, body) = server
        .post("/wallet/approve-request", json!({ "requestId": "nonexistent" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
    assert_eq!(body["retryable"], false);

    let (status, body) = server.post("/wallet/reject-session", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let response = server
        .http
        .post(server.url("/wallet/create"))
        .bearer_auth(AUTH_TOKEN)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn empty_bodies_are_accepted() {
    let Some(server) = start_test_server().await else {
        return;
    };

    let response = server
        .http
        .post(server.url("/wallet/create"))
        .bearer_auth(AUTH_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["mnemonic"].as_str().unwrap().split_whitespace().count(),
        12
    );
}
