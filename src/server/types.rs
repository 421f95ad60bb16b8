//! Request and response DTOs for the wallet HTTP API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::broker::ApprovedSession;

// --- Requests ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateWalletRequest {
    pub mnemonic: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConnectRequest {
    pub uri: Option<String>,
}

/// Body of approve/reject request calls. The id may be sent as a JSON
/// number or string; absent means the most recent request.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestSelector {
    #[serde(alias = "id", deserialize_with = "id_as_string")]
    pub request_id: Option<String>,
}

fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    })
}

// --- Responses ---

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub success: bool,
    pub connection: Value,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub session: ApprovedSession,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResultResponse {
    pub success: bool,
    pub request_id: u64,
    pub method: String,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub retryable: bool,
}
