//! State owned by the broker task, and the values it hands back to callers.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use super::history::{EventLog, HistoryEntry, HistoryKind};
use super::registry::PendingRequestRegistry;
use crate::relay::{
    ApprovedNamespace, SessionDeleteEvent, SessionProposal, SessionSettlement, SigningRequest,
};
use crate::wallet::{Address, SignerBackend, WalletIdentity};

/// The single settled session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedSession {
    pub topic: String,
    pub proposal_id: u64,
    pub relay_protocol: String,
    pub namespaces: BTreeMap<String, ApprovedNamespace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    pub peer: Value,
}

impl ApprovedSession {
    pub fn from_settlement(
        proposal: &SessionProposal,
        relay_protocol: String,
        namespaces: BTreeMap<String, ApprovedNamespace>,
        settlement: SessionSettlement,
    ) -> Self {
        let peer = if settlement.peer.is_null() {
            proposal.params.proposer.clone()
        } else {
            settlement.peer
        };
        Self {
            topic: settlement.topic,
            proposal_id: proposal.id,
            relay_protocol,
            namespaces,
            expiry: settlement.expiry,
            peer,
        }
    }
}

/// Returned from wallet creation. The mnemonic is only present for key
/// wallets and is shown to the operator exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletCreated {
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub impersonated: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Result of an approved signing request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningResult {
    pub request_id: u64,
    pub method: String,
    pub result: Value,
}

/// Read-only view of the broker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub initialized: bool,
    pub address: Option<Address>,
    pub impersonated: bool,
    pub connected: bool,
    pub session: Option<ApprovedSession>,
    pub pending_requests: Vec<(String, Value)>,
    pub history: Vec<HistoryEntry>,
}

/// Everything the broker owns. Only the broker task touches it.
#[derive(Default)]
pub struct BrokerState {
    pub(crate) identity: Option<WalletIdentity>,
    pub(crate) signer: Option<Arc<SignerBackend>>,
    pub(crate) session: Option<ApprovedSession>,
    pub(crate) registry: PendingRequestRegistry,
    pub(crate) history: EventLog,
    pub(crate) wallet_in_flight: bool,
}

impl BrokerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> Option<Address> {
        self.identity.as_ref().map(WalletIdentity::address)
    }

    /// Replace the wallet identity and its signer.
    pub fn install_identity(&mut self, identity: WalletIdentity, signer: SignerBackend) {
        let address = identity.address();
        let (impersonated, source) = match &identity {
            WalletIdentity::Key(key) => (false, Some(key.source())),
            WalletIdentity::Impersonated(_) => (true, None),
        };
        if let Some(previous) = self.address() {
            tracing::info!(%previous, %address, "Replacing wallet identity");
        }
        if self.session.is_some() {
            tracing::warn!(
                %address,
                "Wallet replaced while a session is active; the session still lists the previous account"
            );
        }

        self.identity = Some(identity);
        self.signer = Some(Arc::new(signer));
        self.history.append(
            HistoryKind::WalletCreated,
            json!({
                "address": address,
                "impersonated": impersonated,
                "mnemonic_source": source.map(|s| s.as_str()),
            }),
        );
    }

    pub fn record_proposal(&mut self, proposal: SessionProposal) {
        let id = proposal.id;
        let mut context = json!({ "proposal": proposal });
        if let Some(previous) = self.registry.set_proposal(proposal) {
            tracing::warn!(
                superseded = previous.id,
                proposal_id = id,
                "New session proposal replaces an unresolved one"
            );
            context["superseded"] = json!(previous.id);
        } else {
            tracing::info!(proposal_id = id, "Session proposal received");
        }
        self.history.append(HistoryKind::SessionProposal, context);
    }

    pub fn record_request(&mut self, request: SigningRequest) {
        tracing::info!(
            request_id = request.id,
            method = request.method(),
            "Signing request received"
        );
        if self.registry.get(request.id).is_some() && !self.registry.is_in_flight(request.id) {
            tracing::warn!(request_id = request.id, "Duplicate request id replaces pending entry");
        }
        let mut context = json!({ "request": &request });
        if let Err(refused) = self.registry.insert_request(request) {
            tracing::warn!(
                request_id = refused.id,
                method = refused.method(),
                "Request id is already being processed; new request refused"
            );
            context["refused"] = json!("request id is already being processed");
        }
        self.history.append(HistoryKind::SessionRequest, context);
    }

    pub fn record_delete(&mut self, event: SessionDeleteEvent) {
        let had_session = self.session.take().is_some();
        tracing::info!(topic = %event.topic, had_session, "Session deleted by peer");
        self.history.append(
            HistoryKind::SessionDeleted,
            json!({ "event": event, "had_session": had_session }),
        );
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            initialized: self.identity.is_some(),
            address: self.address(),
            impersonated: self
                .identity
                .as_ref()
                .is_some_and(WalletIdentity::is_impersonated),
            connected: self.session.is_some(),
            session: self.session.clone(),
            pending_requests: self.registry.snapshot(),
            history: self.history.entries().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::ProposalParams;
    use crate::testing::ScriptedRpc;
    use crate::wallet::identity::ImpersonatedIdentity;

    fn proposal(id: u64) -> SessionProposal {
        SessionProposal {
            id,
            params: ProposalParams::default(),
        }
    }

    fn impersonated(state: &mut BrokerState) -> Address {
        let address = Address::from_bytes([0xab; 20]);
        let identity = WalletIdentity::Impersonated(ImpersonatedIdentity::new(address));
        let signer = SignerBackend::for_identity(&identity, Arc::new(ScriptedRpc::new()));
        state.install_identity(identity, signer);
        address
    }

    #[test]
    fn empty_state_snapshot() {
        let snapshot = BrokerState::new().snapshot();
        assert!(!snapshot.initialized);
        assert!(!snapshot.connected);
        assert!(snapshot.address.is_none());
        assert!(snapshot.pending_requests.is_empty());
        assert!(snapshot.history.is_empty());
    }

    #[test]
    fn installing_identity_is_recorded() {
        let mut state = BrokerState::new();
        let address = impersonated(&mut state);

        let snapshot = state.snapshot();
        assert!(snapshot.initialized);
        assert!(snapshot.impersonated);
        assert_eq!(snapshot.address, Some(address));
        assert_eq!(snapshot.history[0].kind, HistoryKind::WalletCreated);
        assert_eq!(snapshot.history[0].context["impersonated"], true);
        assert!(snapshot.history[0].context["mnemonic_source"].is_null());
    }

    #[test]
    fn superseded_proposal_is_noted_in_history() {
        let mut state = BrokerState::new();
        state.record_proposal(proposal(1));
        state.record_proposal(proposal(2));

        assert_eq!(state.registry.proposal().unwrap().id, 2);
        let last = state.history.last().unwrap();
        assert_eq!(last.context["superseded"], 1);
    }

    #[test]
    fn delete_clears_session() {
        let mut state = BrokerState::new();
        state.session = Some(ApprovedSession {
            topic: "t".to_string(),
            proposal_id: 1,
            relay_protocol: "irn".to_string(),
            namespaces: BTreeMap::new(),
            expiry: None,
            peer: Value::Null,
        });
        assert!(state.snapshot().connected);

        state.record_delete(SessionDeleteEvent {
            id: 1,
            topic: "t".to_string(),
        });
        let snapshot = state.snapshot();
        assert!(!snapshot.connected);
        assert_eq!(snapshot.history[0].kind, HistoryKind::SessionDeleted);
        assert_eq!(snapshot.history[0].context["had_session"], true);
    }

    #[test]
    fn wallet_created_serializes_without_absent_fields() {
        let created = WalletCreated {
            address: Address::from_bytes([0xab; 20]),
            mnemonic: None,
            impersonated: true,
        };
        let value = serde_json::to_value(&created).unwrap();
        assert!(value.get("mnemonic").is_none());
        assert_eq!(value["impersonated"], true);
    }
}
