//! Session & request lifecycle broker.
//!
//! One tokio task owns [`BrokerState`]. Operator commands and relay events are
//! queued on a bounded channel and applied in order. Relay and node I/O runs
//! in spawned tasks that report back with a [`Completion`], so inbound events
//! keep flowing while a signature or submission is pending.

pub mod dispatch;
pub mod history;
pub mod namespaces;
pub mod registry;
pub mod state;

pub use history::{EventLog, HistoryEntry, HistoryKind};
pub use namespaces::NamespacePolicy;
pub use registry::PendingRequestRegistry;
pub use state::{ApprovedSession, BrokerState, SigningResult, StatusSnapshot, WalletCreated};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{BrokerError, RelayError, Result, RpcError};
use crate::relay::{
    ApprovedNamespace, JsonRpcResponse, RejectionReason, RelayClient, RelayEvent,
    SessionDeleteEvent, SessionProposal, SessionSettlement, SigningRequest,
};
use crate::rpc::RpcClient;
use crate::wallet::identity::{ImpersonatedIdentity, KeyIdentity};
use crate::wallet::{Address, SignerBackend, WalletIdentity, WordCount};

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Broker tuning that does not change at runtime.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub policy: NamespacePolicy,
    pub word_count: WordCount,
    pub queue_capacity: usize,
}

impl BrokerSettings {
    pub fn new(policy: NamespacePolicy) -> Self {
        Self {
            policy,
            word_count: WordCount::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    CreateWallet {
        mnemonic: Option<String>,
        address: Option<String>,
        reply: Reply<WalletCreated>,
    },
    Pair {
        uri: String,
        reply: Reply<Value>,
    },
    ApproveSession {
        reply: Reply<ApprovedSession>,
    },
    RejectSession {
        reply: Reply<()>,
    },
    ApproveRequest {
        request_id: Option<String>,
        reply: Reply<SigningResult>,
    },
    RejectRequest {
        request_id: Option<String>,
        reply: Reply<()>,
    },
    Status {
        reply: Reply<StatusSnapshot>,
    },
}

/// Outcome of collaborator I/O started by the broker task.
enum Completion {
    Impersonated {
        address: Address,
        outcome: std::result::Result<(), RpcError>,
        reply: Reply<WalletCreated>,
    },
    Paired {
        outcome: std::result::Result<Value, RelayError>,
        reply: Reply<Value>,
    },
    SessionApproved {
        proposal: SessionProposal,
        relay_protocol: String,
        namespaces: BTreeMap<String, ApprovedNamespace>,
        outcome: std::result::Result<SessionSettlement, RelayError>,
        reply: Reply<ApprovedSession>,
    },
    SessionRejected {
        proposal: SessionProposal,
        outcome: std::result::Result<(), RelayError>,
        reply: Reply<()>,
    },
    RequestApproved {
        request: SigningRequest,
        outcome: Result<Value>,
        reply: Reply<SigningResult>,
    },
    RequestRejected {
        request: SigningRequest,
        outcome: std::result::Result<(), RelayError>,
        reply: Reply<()>,
    },
}

enum BrokerMessage {
    Command(Command),
    Event(RelayEvent),
    Completion(Completion),
}

/// Cloneable handle to the broker task.
#[derive(Clone)]
pub struct SessionBroker {
    tx: mpsc::Sender<BrokerMessage>,
}

impl SessionBroker {
    /// Start the broker task. It stops once every handle is dropped.
    pub fn spawn(
        settings: BrokerSettings,
        relay: Arc<dyn RelayClient>,
        rpc: Arc<dyn RpcClient>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let actor = BrokerActor {
            state: BrokerState::new(),
            settings,
            relay,
            rpc,
            tx: tx.downgrade(),
        };
        let handle = tokio::spawn(actor.run(rx));
        (Self { tx }, handle)
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BrokerMessage::Command(build(reply)))
            .await
            .map_err(|_| BrokerError::Unavailable)?;
        rx.await.map_err(|_| BrokerError::Unavailable)?
    }

    /// Create or replace the wallet identity. `address` wins over `mnemonic`.
    pub async fn create_wallet(
        &self,
        mnemonic: Option<String>,
        address: Option<String>,
    ) -> Result<WalletCreated> {
        self.call(|reply| Command::CreateWallet {
            mnemonic,
            address,
            reply,
        })
        .await
    }

    /// Pair with a dApp from its URI. Returns what the relay reports.
    pub async fn pair(&self, uri: impl Into<String>) -> Result<Value> {
        let uri = uri.into();
        self.call(|reply| Command::Pair { uri, reply }).await
    }

    pub async fn approve_session(&self) -> Result<ApprovedSession> {
        self.call(|reply| Command::ApproveSession { reply }).await
    }

    pub async fn reject_session(&self) -> Result<()> {
        self.call(|reply| Command::RejectSession { reply }).await
    }

    /// Approve a request by id, or the most recent one when `None`.
    pub async fn approve_request(&self, request_id: Option<String>) -> Result<SigningResult> {
        self.call(|reply| Command::ApproveRequest { request_id, reply })
            .await
    }

    /// Reject a request by id, or the most recent one when `None`.
    pub async fn reject_request(&self, request_id: Option<String>) -> Result<()> {
        self.call(|reply| Command::RejectRequest { request_id, reply })
            .await
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        self.call(|reply| Command::Status { reply }).await
    }

    /// Queue an inbound relay event.
    pub async fn on_relay_event(&self, event: RelayEvent) -> Result<()> {
        self.tx
            .send(BrokerMessage::Event(event))
            .await
            .map_err(|_| BrokerError::Unavailable)
    }

    pub async fn on_session_proposal(&self, proposal: SessionProposal) -> Result<()> {
        self.on_relay_event(RelayEvent::SessionProposal(proposal))
            .await
    }

    pub async fn on_session_request(&self, request: SigningRequest) -> Result<()> {
        self.on_relay_event(RelayEvent::SessionRequest(request))
            .await
    }

    pub async fn on_session_delete(&self, event: SessionDeleteEvent) -> Result<()> {
        self.on_relay_event(RelayEvent::SessionDelete(event)).await
    }
}

struct BrokerActor {
    state: BrokerState,
    settings: BrokerSettings,
    relay: Arc<dyn RelayClient>,
    rpc: Arc<dyn RpcClient>,
    tx: mpsc::WeakSender<BrokerMessage>,
}

fn not_initialized() -> BrokerError {
    BrokerError::NotInitialized("Wallet not initialized".to_string())
}

fn send_reply<T>(reply: Reply<T>, result: Result<T>) {
    if reply.send(result).is_err() {
        tracing::debug!("Caller went away before the broker replied");
    }
}

impl BrokerActor {
    async fn run(mut self, mut rx: mpsc::Receiver<BrokerMessage>) {
        tracing::debug!("Session broker started");
        while let Some(message) = rx.recv().await {
            match message {
                BrokerMessage::Command(command) => self.handle_command(command),
                BrokerMessage::Event(event) => self.handle_event(event),
                BrokerMessage::Completion(completion) => self.handle_completion(completion),
            }
        }
        tracing::debug!("Session broker stopped");
    }

    /// Run `work` off the broker task and feed its completion back in.
    /// Returns `false` when the broker is shutting down.
    fn spawn_io<F>(&self, work: F) -> bool
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let Some(tx) = self.tx.upgrade() else {
            return false;
        };
        tokio::spawn(async move {
            let completion = work.await;
            if tx.send(BrokerMessage::Completion(completion)).await.is_err() {
                tracing::debug!("Broker stopped before I/O completed");
            }
        });
        true
    }

    fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::SessionProposal(proposal) => self.state.record_proposal(proposal),
            RelayEvent::SessionRequest(request) => self.state.record_request(request),
            RelayEvent::SessionDelete(event) => self.state.record_delete(event),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::CreateWallet {
                mnemonic,
                address,
                reply,
            } => self.create_wallet(mnemonic, address, reply),
            Command::Pair { uri, reply } => self.pair(uri, reply),
            Command::ApproveSession { reply } => self.approve_session(reply),
            Command::RejectSession { reply } => self.reject_session(reply),
            Command::ApproveRequest { request_id, reply } => {
                self.approve_request(request_id, reply)
            }
            Command::RejectRequest { request_id, reply } => self.reject_request(request_id, reply),
            Command::Status { reply } => send_reply(reply, Ok(self.state.snapshot())),
        }
    }

    fn create_wallet(
        &mut self,
        mnemonic: Option<String>,
        address: Option<String>,
        reply: Reply<WalletCreated>,
    ) {
        if self.state.wallet_in_flight {
            send_reply(
                reply,
                Err(BrokerError::AlreadyInProgress(
                    "Wallet creation is already in progress".to_string(),
                )),
            );
            return;
        }

        let address = address.filter(|a| !a.trim().is_empty());
        if let Some(raw) = address {
            let address = match Address::parse(&raw) {
                Ok(address) => address,
                Err(e) => return send_reply(reply, Err(e.into())),
            };
            let rpc = self.rpc.clone();
            self.state.wallet_in_flight = true;
            let started = self.spawn_io(async move {
                let outcome = rpc.impersonate(&address).await;
                Completion::Impersonated {
                    address,
                    outcome,
                    reply,
                }
            });
            if !started {
                self.state.wallet_in_flight = false;
            }
            return;
        }

        let phrase = mnemonic.filter(|m| !m.trim().is_empty());
        let identity = match KeyIdentity::create(phrase.as_deref(), self.settings.word_count) {
            Ok(identity) => identity,
            Err(e) => return send_reply(reply, Err(e.into())),
        };
        let address = identity.address();
        let revealed = {
            use secrecy::ExposeSecret;
            identity.mnemonic().expose_secret().to_string()
        };
        tracing::info!(
            %address,
            words = identity.word_count(),
            source = identity.source().as_str(),
            "Key wallet created"
        );

        let identity = WalletIdentity::Key(identity);
        let signer = SignerBackend::for_identity(&identity, self.rpc.clone());
        self.state.install_identity(identity, signer);
        send_reply(
            reply,
            Ok(WalletCreated {
                address,
                mnemonic: Some(revealed),
                impersonated: false,
            }),
        );
    }

    fn pair(&mut self, uri: String, reply: Reply<Value>) {
        if self.state.identity.is_none() {
            return send_reply(reply, Err(not_initialized()));
        }
        let uri = uri.trim().to_string();
        if uri.is_empty() {
            return send_reply(
                reply,
                Err(BrokerError::InvalidRequest(
                    "WalletConnect URI is required".to_string(),
                )),
            );
        }

        tracing::info!("Pairing with dApp");
        let relay = self.relay.clone();
        self.spawn_io(async move {
            let outcome = relay.pair(&uri).await;
            Completion::Paired { outcome, reply }
        });
    }

    fn approve_session(&mut self, reply: Reply<ApprovedSession>) {
        let Some(proposal) = self.state.registry.proposal().cloned() else {
            return send_reply(
                reply,
                Err(BrokerError::NotFound(
                    "No pending session proposal".to_string(),
                )),
            );
        };
        let Some(address) = self.state.address() else {
            return send_reply(reply, Err(not_initialized()));
        };

        let namespaces =
            match namespaces::negotiate(&proposal.params, &address, &self.settings.policy) {
                Ok(namespaces) => namespaces,
                Err(e) => {
                    tracing::warn!(proposal_id = proposal.id, error = %e, "Cannot satisfy proposal");
                    return send_reply(reply, Err(e));
                }
            };
        if let Err(e) = self.state.registry.begin_proposal() {
            return send_reply(reply, Err(e));
        }

        let relay_protocol = proposal.relay_protocol().to_string();
        tracing::info!(
            proposal_id = proposal.id,
            %relay_protocol,
            namespaces = namespaces.len(),
            "Approving session proposal"
        );
        let relay = self.relay.clone();
        let started = self.spawn_io(async move {
            let outcome = relay
                .approve_session(proposal.id, &relay_protocol, &namespaces)
                .await;
            Completion::SessionApproved {
                proposal,
                relay_protocol,
                namespaces,
                outcome,
                reply,
            }
        });
        if !started {
            self.state.registry.finish_proposal();
        }
    }

    fn reject_session(&mut self, reply: Reply<()>) {
        let Some(proposal) = self.state.registry.proposal().cloned() else {
            return send_reply(
                reply,
                Err(BrokerError::NotFound(
                    "No pending session proposal".to_string(),
                )),
            );
        };
        if let Err(e) = self.state.registry.begin_proposal() {
            return send_reply(reply, Err(e));
        }

        tracing::info!(proposal_id = proposal.id, "Rejecting session proposal");
        let relay = self.relay.clone();
        let started = self.spawn_io(async move {
            let outcome = relay
                .reject(proposal.id, &RejectionReason::user_rejected())
                .await;
            Completion::SessionRejected {
                proposal,
                outcome,
                reply,
            }
        });
        if !started {
            self.state.registry.finish_proposal();
        }
    }

    fn approve_request(&mut self, request_id: Option<String>, reply: Reply<SigningResult>) {
        let id = match self.state.registry.resolve(request_id.as_deref()) {
            Ok(id) => id,
            Err(e) => return send_reply(reply, Err(e)),
        };
        let Some(signer) = self.state.signer.clone() else {
            return send_reply(reply, Err(not_initialized()));
        };
        if let Err(e) = self.state.registry.begin(id) {
            return send_reply(reply, Err(e));
        }
        let Some(request) = self.state.registry.get(id).cloned() else {
            self.state.registry.finish(id);
            return send_reply(
                reply,
                Err(BrokerError::NotFound("Request not found".to_string())),
            );
        };

        tracing::info!(request_id = id, method = request.method(), "Approving request");
        let relay = self.relay.clone();
        let started = self.spawn_io(async move {
            let outcome = async {
                let result = dispatch::dispatch(signer.as_ref(), &request).await?;
                relay
                    .respond(
                        &request.topic,
                        &JsonRpcResponse::success(request.id, result.clone()),
                    )
                    .await?;
                Ok::<Value, BrokerError>(result)
            }
            .await;
            Completion::RequestApproved {
                request,
                outcome,
                reply,
            }
        });
        if !started {
            self.state.registry.finish(id);
        }
    }

    fn reject_request(&mut self, request_id: Option<String>, reply: Reply<()>) {
        let id = match self.state.registry.resolve(request_id.as_deref()) {
            Ok(id) => id,
            Err(e) => return send_reply(reply, Err(e)),
        };
        if let Err(e) = self.state.registry.begin(id) {
            return send_reply(reply, Err(e));
        }
        let Some(request) = self.state.registry.get(id).cloned() else {
            self.state.registry.finish(id);
            return send_reply(
                reply,
                Err(BrokerError::NotFound("Request not found".to_string())),
            );
        };

        tracing::info!(request_id = id, method = request.method(), "Rejecting request");
        let relay = self.relay.clone();
        let started = self.spawn_io(async move {
            let response = JsonRpcResponse::rejected(request.id, RejectionReason::user_rejected());
            let outcome = relay.respond(&request.topic, &response).await;
            Completion::RequestRejected {
                request,
                outcome,
                reply,
            }
        });
        if !started {
            self.state.registry.finish(id);
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Impersonated {
                address,
                outcome,
                reply,
            } => {
                self.state.wallet_in_flight = false;
                if let Err(e) = outcome {
                    tracing::error!(%address, error = %e, "Node refused impersonation");
                    return send_reply(reply, Err(e.into()));
                }
                tracing::info!(%address, "Impersonated wallet created");
                let identity = WalletIdentity::Impersonated(ImpersonatedIdentity::new(address));
                let signer = SignerBackend::for_identity(&identity, self.rpc.clone());
                self.state.install_identity(identity, signer);
                send_reply(
                    reply,
                    Ok(WalletCreated {
                        address,
                        mnemonic: None,
                        impersonated: true,
                    }),
                );
            }
            Completion::Paired { outcome, reply } => match outcome {
                Ok(connection) => {
                    tracing::info!("Pairing started");
                    self.state.history.append(
                        HistoryKind::PairingAttempt,
                        json!({ "success": true, "connection": &connection }),
                    );
                    send_reply(reply, Ok(connection));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Pairing failed");
                    self.state.history.append(
                        HistoryKind::PairingAttempt,
                        json!({ "success": false, "error": e.to_string() }),
                    );
                    send_reply(reply, Err(e.into()));
                }
            },
            Completion::SessionApproved {
                proposal,
                relay_protocol,
                namespaces,
                outcome,
                reply,
            } => {
                self.state.registry.finish_proposal();
                let settlement = match outcome {
                    Ok(settlement) => settlement,
                    Err(e) => {
                        tracing::error!(proposal_id = proposal.id, error = %e, "Session approval failed");
                        return send_reply(reply, Err(e.into()));
                    }
                };
                if self.state.registry.take_proposal(proposal.id).is_none() {
                    tracing::warn!(
                        proposal_id = proposal.id,
                        "Approved proposal was superseded while the relay call was running"
                    );
                }
                let session =
                    ApprovedSession::from_settlement(&proposal, relay_protocol, namespaces, settlement);
                tracing::info!(topic = %session.topic, "Session approved");
                self.state.session = Some(session.clone());
                self.state
                    .history
                    .append(HistoryKind::SessionApproved, json!({ "session": &session }));
                send_reply(reply, Ok(session));
            }
            Completion::SessionRejected {
                proposal,
                outcome,
                reply,
            } => {
                self.state.registry.finish_proposal();
                if let Err(e) = outcome {
                    tracing::error!(proposal_id = proposal.id, error = %e, "Session rejection failed");
                    return send_reply(reply, Err(e.into()));
                }
                self.state.registry.take_proposal(proposal.id);
                tracing::info!(proposal_id = proposal.id, "Session rejected");
                self.state
                    .history
                    .append(HistoryKind::SessionRejected, json!({ "proposal": &proposal }));
                send_reply(reply, Ok(()));
            }
            Completion::RequestApproved {
                request,
                outcome,
                reply,
            } => {
                let result = match outcome {
                    Ok(result) => result,
                    Err(e) => {
                        self.state.registry.finish(request.id);
                        tracing::error!(request_id = request.id, error = %e, "Request approval failed");
                        return send_reply(reply, Err(e));
                    }
                };
                if self.state.registry.remove_dispatched(&request).is_none() {
                    tracing::warn!(
                        request_id = request.id,
                        "Approved request was replaced while it was being processed"
                    );
                }
                tracing::info!(request_id = request.id, "Request approved");
                self.state.history.append(
                    HistoryKind::RequestApproved,
                    json!({ "request": &request, "result": &result }),
                );
                send_reply(
                    reply,
                    Ok(SigningResult {
                        request_id: request.id,
                        method: request.method().to_string(),
                        result,
                    }),
                );
            }
            Completion::RequestRejected {
                request,
                outcome,
                reply,
            } => {
                if let Err(e) = outcome {
                    self.state.registry.finish(request.id);
                    tracing::error!(request_id = request.id, error = %e, "Request rejection failed");
                    return send_reply(reply, Err(e.into()));
                }
                if self.state.registry.remove_dispatched(&request).is_none() {
                    tracing::warn!(
                        request_id = request.id,
                        "Rejected request was replaced while it was being processed"
                    );
                }
                tracing::info!(request_id = request.id, "Request rejected");
                self.state
                    .history
                    .append(HistoryKind::RequestRejected, json!({ "request": &request }));
                send_reply(reply, Ok(()));
            }
        }
    }
}
