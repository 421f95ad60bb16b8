//! HTTP client for the relay bridge sidecar.
//!
//! The bridge owns the relay SDK session. Calls map one-to-one onto bridge
//! endpoints; inbound events come back through `POST /relay/events` on our
//! own HTTP server.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Value, json};

use super::{
    ApprovedNamespace, JsonRpcResponse, RejectionReason, RelayClient, SessionSettlement,
    WalletMetadata,
};
use crate::error::RelayError;

pub struct HttpRelayBridge {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitRequest<'a> {
    project_id: &'a str,
    metadata: &'a WalletMetadata,
    events_url: &'a str,
    /// Bearer token the bridge must send when posting to `events_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    events_token: Option<&'a str>,
}

impl HttpRelayBridge {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Register with the sidecar. Safe to repeat; the sidecar replaces its
    /// previous registration.
    ///
    /// The sidecar starts its relay session with `project_id` and pushes
    /// inbound events to `events_url`, presenting `events_token` as a bearer
    /// token when one is given.
    pub async fn init(
        &self,
        project_id: &SecretString,
        metadata: &WalletMetadata,
        events_url: &str,
        events_token: Option<&SecretString>,
    ) -> Result<(), RelayError> {
        let body = InitRequest {
            project_id: project_id.expose_secret(),
            metadata,
            events_url,
            events_token: events_token.map(|token| token.expose_secret()),
        };
        self.post("init", "/init", &body).await?;
        tracing::info!(bridge = %self.base_url, events_url, "Relay bridge initialized");
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reachability check used by `doctor`.
    pub async fn health(&self) -> Result<(), RelayError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::RequestFailed {
                operation: "health".to_string(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(RelayError::Status {
            operation: "health".to_string(),
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
    ) -> Result<Value, RelayError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(operation, %url, "Relay bridge call");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RelayError::RequestFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RelayError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RelayError::InvalidResponse {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RelayClient for HttpRelayBridge {
    async fn pair(&self, uri: &str) -> Result<Value, RelayError> {
        self.post("pair", "/pair", &json!({ "uri": uri })).await
    }

    async fn approve_session(
        &self,
        proposal_id: u64,
        relay_protocol: &str,
        namespaces: &BTreeMap<String, ApprovedNamespace>,
    ) -> Result<SessionSettlement, RelayError> {
        let body = json!({
            "id": proposal_id,
            "relayProtocol": relay_protocol,
            "namespaces": namespaces,
        });
        let value = self.post("approve-session", "/approve-session", &body).await?;
        serde_json::from_value(value).map_err(|e| RelayError::InvalidResponse {
            operation: "approve-session".to_string(),
            reason: e.to_string(),
        })
    }

    async fn reject(&self, proposal_id: u64, reason: &RejectionReason) -> Result<(), RelayError> {
        self.post("reject", "/reject", &json!({ "id": proposal_id, "reason": reason }))
            .await
            .map(|_| ())
    }

    async fn respond(&self, topic: &str, response: &JsonRpcResponse) -> Result<(), RelayError> {
        self.post(
            "respond",
            "/respond",
            &json!({ "topic": topic, "response": response }),
        )
        .await
        .map(|_| ())
    }
}
