//! In-memory collaborators for tests: a relay that records every call and a
//! node whose responses are scripted per method.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::error::{RelayError, RpcError};
use crate::relay::{
    ApprovedNamespace, JsonRpcResponse, RejectionReason, RelayClient, SessionSettlement,
};
use crate::rpc::RpcClient;

/// One outbound relay call.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayCall {
    Pair {
        uri: String,
    },
    ApproveSession {
        proposal_id: u64,
        relay_protocol: String,
        namespaces: BTreeMap<String, ApprovedNamespace>,
    },
    Reject {
        proposal_id: u64,
        reason: RejectionReason,
    },
    Respond {
        topic: String,
        response: JsonRpcResponse,
    },
}

/// Relay double. Calls are recorded before they complete, so a held relay
/// still shows the call that is waiting.
#[derive(Default)]
pub struct RecordingRelay {
    calls: Mutex<Vec<RelayCall>>,
    failing: Mutex<HashSet<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` (`pair`, `approve_session`, `reject`, `respond`) fail.
    pub fn failing(self, operation: &str) -> Self {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation.to_string());
        self
    }

    /// Hold every call until [`RecordingRelay::release`] grants a permit.
    pub fn held(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn recover(&self, operation: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(operation);
    }

    pub fn calls(&self) -> Vec<RelayCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn responses(&self) -> Vec<JsonRpcResponse> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RelayCall::Respond { response, .. } => Some(response),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` calls have been recorded.
    pub async fn wait_for_calls(&self, count: usize) {
        for _ in 0..400 {
            if self.calls().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {count} relay calls, saw {:?}",
            self.calls()
        );
    }

    async fn enter(&self, operation: &str, call: RelayCall) -> Result<(), RelayError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(operation)
        {
            return Err(RelayError::RequestFailed {
                operation: operation.to_string(),
                reason: "relay unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RelayClient for RecordingRelay {
    async fn pair(&self, uri: &str) -> Result<Value, RelayError> {
        self.enter(
            "pair",
            RelayCall::Pair {
                uri: uri.to_string(),
            },
        )
        .await?;
        Ok(json!({ "topic": "pairing-topic", "active": false }))
    }

    async fn approve_session(
        &self,
        proposal_id: u64,
        relay_protocol: &str,
        namespaces: &BTreeMap<String, ApprovedNamespace>,
    ) -> Result<SessionSettlement, RelayError> {
        self.enter(
            "approve_session",
            RelayCall::ApproveSession {
                proposal_id,
                relay_protocol: relay_protocol.to_string(),
                namespaces: namespaces.clone(),
            },
        )
        .await?;
        Ok(SessionSettlement {
            topic: format!("session-{proposal_id}"),
            expiry: Some(1_700_000_000),
            peer: Value::Null,
        })
    }

    async fn reject(&self, proposal_id: u64, reason: &RejectionReason) -> Result<(), RelayError> {
        self.enter(
            "reject",
            RelayCall::Reject {
                proposal_id,
                reason: reason.clone(),
            },
        )
        .await
    }

    async fn respond(&self, topic: &str, response: &JsonRpcResponse) -> Result<(), RelayError> {
        self.enter(
            "respond",
            RelayCall::Respond {
                topic: topic.to_string(),
                response: response.clone(),
            },
        )
        .await
    }
}

type Scripted = Result<Value, (i64, String)>;

/// Node double. Each method answers from its own queue; the last queued
/// answer repeats. Unscripted methods fail with `-32601`.
#[derive(Default)]
pub struct ScriptedRpc {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, method: &str, result: Value) -> Self {
        self.push(method, Ok(result));
        self
    }

    pub fn with_error(self, method: &str, code: i64, message: &str) -> Self {
        self.push(method, Err((code, message.to_string())));
        self
    }

    fn push(&self, method: &str, answer: Scripted) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(method.to_string())
            .or_default()
            .push_back(answer);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Params of every call to `method`, in order.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params)
            .collect()
    }
}

#[async_trait]
impl RpcClient for ScriptedRpc {
    async fn send(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((method.to_string(), params));

        let answer = {
            let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
            match responses.get_mut(method) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match answer {
            Some(Ok(value)) => Ok(value),
            Some(Err((code, message))) => Err(RpcError::Node {
                method: method.to_string(),
                code,
                message,
            }),
            None => Err(RpcError::Node {
                method: method.to_string(),
                code: -32601,
                message: format!("method {method} not scripted"),
            }),
        }
    }
}
