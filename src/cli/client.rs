//! Thin HTTP client for the wallet API used by the operator commands.

use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::{Client, Method};
use serde_json::Value;

pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("cannot reach wallet API at {}", self.base_url))?;
        let status = response.status();
        let text = response.text().await.context("failed to read response")?;
        let data: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .with_context(|| format!("wallet API returned non-JSON body: {text}"))?
        };

        if !status.is_success() {
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
            return Err(anyhow!(message));
        }
        Ok(data)
    }
}

/// Whether a status payload lists a pending session proposal.
pub fn has_pending_proposal(status: &Value) -> bool {
    status
        .get("pendingRequests")
        .and_then(Value::as_array)
        .is_some_and(|entries| {
            entries.iter().any(|entry| {
                entry
                    .get(0)
                    .and_then(Value::as_str)
                    .is_some_and(|key| key == crate::broker::registry::SESSION_PROPOSAL_KEY)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_pending_proposal() {
        assert!(has_pending_proposal(&json!({
            "pendingRequests": [["session_proposal", {"id": 1}], ["session_request", 4]]
        })));
        assert!(!has_pending_proposal(&json!({
            "pendingRequests": [["4", {"id": 4}]]
        })));
        assert!(!has_pending_proposal(&json!({})));
    }

    #[test]
    fn blank_token_is_ignored() {
        let client = ApiClient::new("http://localhost:4000/", Some("  ".to_string())).unwrap();
        assert!(client.token.is_none());
        assert_eq!(client.base_url(), "http://localhost:4000");
    }
}
