//! Session relay: wire types exchanged with dApps and the outbound client trait.
//!
//! The relay protocol itself (pairing URIs, encrypted messaging) lives in a
//! bridge sidecar. This module only models what crosses the boundary: inbound
//! events pushed by the bridge and the four outbound calls the broker makes.

pub mod bridge;

pub use bridge::HttpRelayBridge;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Relay protocol used when a proposal offers none.
pub const DEFAULT_RELAY_PROTOCOL: &str = "irn";

/// Capabilities requested for one namespace of a proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalNamespace {
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// Capabilities granted for one namespace of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedNamespace {
    pub chains: Vec<String>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
    pub accounts: Vec<String>,
    pub rpc_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayProtocol {
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalParams {
    #[serde(default)]
    pub required_namespaces: BTreeMap<String, ProposalNamespace>,
    #[serde(default)]
    pub optional_namespaces: BTreeMap<String, ProposalNamespace>,
    #[serde(default)]
    pub relays: Vec<RelayProtocol>,
    /// Proposer metadata, kept for display only.
    #[serde(default)]
    pub proposer: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_timestamp: Option<u64>,
}

/// An inbound pairing request from a dApp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProposal {
    pub id: u64,
    pub params: ProposalParams,
}

impl SessionProposal {
    /// First relay protocol the dApp offered.
    pub fn relay_protocol(&self) -> &str {
        self.params
            .relays
            .first()
            .map(|relay| relay.protocol.as_str())
            .unwrap_or(DEFAULT_RELAY_PROTOCOL)
    }
}

/// The JSON-RPC call a dApp wants the wallet to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default, deserialize_with = "params_list")]
    pub params: Vec<Value>,
}

/// Accept positional arrays, a bare object, or nothing at all.
fn params_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequestParams {
    pub request: RpcRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

/// A signing request delivered over an established session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub id: u64,
    pub topic: String,
    pub params: SigningRequestParams,
}

impl SigningRequest {
    pub fn method(&self) -> &str {
        &self.params.request.method
    }

    pub fn call_params(&self) -> &[Value] {
        &self.params.request.params
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDeleteEvent {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub topic: String,
}

/// Events the relay bridge pushes into the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum RelayEvent {
    SessionProposal(SessionProposal),
    SessionRequest(SigningRequest),
    SessionDelete(SessionDeleteEvent),
}

/// What the relay reports once a session is settled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSettlement {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    #[serde(default)]
    pub peer: Value,
}

/// Reason attached to a rejected proposal or request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionReason {
    pub code: i64,
    pub message: String,
}

impl RejectionReason {
    pub fn user_rejected() -> Self {
        Self {
            code: 5000,
            message: "User rejected.".to_string(),
        }
    }
}

/// A JSON-RPC 2.0 response sent back to the dApp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub id: u64,
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RejectionReason>,
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn rejected(id: u64, reason: RejectionReason) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(reason),
        }
    }
}

/// Wallet metadata advertised to dApps during pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

/// Outbound relay operations.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Start pairing from a dApp-provided URI. Returns whatever the relay
    /// reports about the pairing.
    async fn pair(&self, uri: &str) -> Result<Value, RelayError>;

    async fn approve_session(
        &self,
        proposal_id: u64,
        relay_protocol: &str,
        namespaces: &BTreeMap<String, ApprovedNamespace>,
    ) -> Result<SessionSettlement, RelayError>;

    async fn reject(&self, proposal_id: u64, reason: &RejectionReason) -> Result<(), RelayError>;

    async fn respond(&self, topic: &str, response: &JsonRpcResponse) -> Result<(), RelayError>;
}
