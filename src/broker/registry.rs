//! Pending session proposal and signing requests awaiting an operator decision.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};

use crate::error::BrokerError;
use crate::relay::{SessionProposal, SigningRequest};

/// Key under which the pending proposal is listed in status output.
pub const SESSION_PROPOSAL_KEY: &str = "session_proposal";
/// Key under which the most recent request id is listed in status output.
pub const SESSION_REQUEST_KEY: &str = "session_request";

#[derive(Debug, Default)]
pub struct PendingRequestRegistry {
    proposal: Option<SessionProposal>,
    requests: BTreeMap<u64, SigningRequest>,
    most_recent_request_id: Option<u64>,
    in_flight: BTreeSet<u64>,
    proposal_in_flight: bool,
}

impl PendingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `proposal`, returning the one it replaced, if any.
    pub fn set_proposal(&mut self, proposal: SessionProposal) -> Option<SessionProposal> {
        self.proposal.replace(proposal)
    }

    pub fn proposal(&self) -> Option<&SessionProposal> {
        self.proposal.as_ref()
    }

    /// Remove the stored proposal if it is still the one with `id`.
    pub fn take_proposal(&mut self, id: u64) -> Option<SessionProposal> {
        if self.proposal.as_ref().is_some_and(|p| p.id == id) {
            self.proposal.take()
        } else {
            None
        }
    }

    pub fn begin_proposal(&mut self) -> Result<(), BrokerError> {
        if self.proposal_in_flight {
            return Err(BrokerError::AlreadyInProgress(
                "Session proposal is already being resolved".to_string(),
            ));
        }
        self.proposal_in_flight = true;
        Ok(())
    }

    pub fn finish_proposal(&mut self) {
        self.proposal_in_flight = false;
    }

    /// Store `request` and mark it as the most recent one.
    ///
    /// An id that is being dispatched is refused and `request` handed back;
    /// the dispatch would otherwise resolve the newcomer without answering it.
    pub fn insert_request(&mut self, request: SigningRequest) -> Result<(), SigningRequest> {
        let id = request.id;
        if self.is_in_flight(id) {
            return Err(request);
        }
        self.requests.insert(id, request);
        self.most_recent_request_id = Some(id);
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<&SigningRequest> {
        self.requests.get(&id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn most_recent_request_id(&self) -> Option<u64> {
        self.most_recent_request_id
    }

    /// Resolve an operator-supplied id. `None` means the most recent request.
    pub fn resolve(&self, requested: Option<&str>) -> Result<u64, BrokerError> {
        let id = match requested.map(str::trim).filter(|s| !s.is_empty()) {
            None => self
                .most_recent_request_id
                .ok_or_else(|| BrokerError::NotFound("No pending requests".to_string()))?,
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| BrokerError::NotFound("Request not found".to_string()))?,
        };
        if !self.requests.contains_key(&id) {
            return Err(BrokerError::NotFound("Request not found".to_string()));
        }
        Ok(id)
    }

    /// Mark `id` as being dispatched.
    pub fn begin(&mut self, id: u64) -> Result<(), BrokerError> {
        if !self.in_flight.insert(id) {
            return Err(BrokerError::AlreadyInProgress(format!(
                "Request {id} is already being processed"
            )));
        }
        Ok(())
    }

    pub fn finish(&mut self, id: u64) {
        self.in_flight.remove(&id);
    }

    pub fn is_in_flight(&self, id: u64) -> bool {
        self.in_flight.contains(&id)
    }

    /// Remove a request. Clears the most-recent marker when it pointed here.
    pub fn remove(&mut self, id: u64) -> Option<SigningRequest> {
        self.in_flight.remove(&id);
        if self.most_recent_request_id == Some(id) {
            self.most_recent_request_id = None;
        }
        self.requests.remove(&id)
    }

    /// Finish a dispatch of `dispatched` and remove it, unless the stored
    /// entry under its id is no longer that request.
    pub fn remove_dispatched(&mut self, dispatched: &SigningRequest) -> Option<SigningRequest> {
        let id = dispatched.id;
        if self.requests.get(&id) != Some(dispatched) {
            self.in_flight.remove(&id);
            return None;
        }
        self.remove(id)
    }

    /// `[key, entry]` pairs: the proposal, each request by id, then the
    /// most-recent marker.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let mut out = Vec::with_capacity(self.requests.len() + 2);
        if let Some(proposal) = &self.proposal {
            out.push((SESSION_PROPOSAL_KEY.to_string(), json!(proposal)));
        }
        for (id, request) in &self.requests {
            out.push((id.to_string(), json!(request)));
        }
        if let Some(id) = self.most_recent_request_id {
            out.push((SESSION_REQUEST_KEY.to_string(), json!(id)));
        }
        out
    }
}
