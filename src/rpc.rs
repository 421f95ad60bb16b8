//! JSON-RPC client for the EVM node.
//!
//! The node is the only collaborator that sees transactions. Impersonation
//! support (`anvil_impersonateAccount`) assumes a development node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use crate::error::RpcError;
use crate::wallet::Address;

/// Outbound JSON-RPC calls made by signer backends and the broker.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Call `method` with positional `params` and return the `result` member.
    async fn send(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Ask the node to accept transactions from `address` without its key.
    async fn impersonate(&self, address: &Address) -> Result<(), RpcError> {
        self.send("anvil_impersonateAccount", json!([address.to_checksum()]))
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Keeps an explicit `null` result distinct from a missing one.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 over HTTP POST.
pub struct HttpRpcClient {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn send(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::debug!(method, id, "JSON-RPC call");

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let parsed: RpcResponse =
            serde_json::from_str(&text).map_err(|e| RpcError::InvalidResponse {
                method: method.to_string(),
                reason: format!("HTTP {status}: {e}"),
            })?;

        decode_response(method, parsed)
    }
}

fn decode_response(method: &str, response: RpcResponse) -> Result<Value, RpcError> {
    if let Some(error) = response.error {
        return Err(RpcError::Node {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        });
    }
    response.result.ok_or_else(|| RpcError::InvalidResponse {
        method: method.to_string(),
        reason: "response carried neither result nor error".to_string(),
    })
}

/// Read a `0x`-hex quantity result as `u64`.
pub fn quantity_to_u64(method: &str, value: &Value) -> Result<u64, RpcError> {
    let invalid = |reason: String| RpcError::InvalidResponse {
        method: method.to_string(),
        reason,
    };
    let text = value
        .as_str()
        .ok_or_else(|| invalid(format!("expected hex quantity, got {value}")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| invalid(format!("quantity '{text}' is not 0x-prefixed")))?;
    u64::from_str_radix(digits, 16).map_err(|e| invalid(format!("quantity '{text}': {e}")))
}
