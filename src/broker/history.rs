//! Append-only event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of history entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    WalletCreated,
    PairingAttempt,
    SessionProposal,
    SessionRequest,
    SessionApproved,
    SessionRejected,
    SessionDeleted,
    RequestApproved,
    RequestRejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub timestamp: DateTime<Utc>,
    pub context: Value,
}

/// Time-ordered record of everything the broker did. Entries are never
/// mutated or removed.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Vec<HistoryEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the current time. Timestamps never go
    /// backwards even if the wall clock does.
    pub fn append(&mut self, kind: HistoryKind, context: Value) {
        let mut timestamp = Utc::now();
        if let Some(last) = self.entries.last()
            && last.timestamp > timestamp
        {
            timestamp = last.timestamp;
        }
        tracing::debug!(?kind, "History entry appended");
        self.entries.push(HistoryEntry {
            kind,
            timestamp,
            context,
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_in_order_with_monotonic_timestamps() {
        let mut log = EventLog::new();
        log.append(HistoryKind::WalletCreated, json!({"address": "0x1"}));
        log.append(HistoryKind::PairingAttempt, json!({"success": true}));
        log.append(HistoryKind::SessionProposal, json!({}));

        let kinds: Vec<_> = log.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                HistoryKind::WalletCreated,
                HistoryKind::PairingAttempt,
                HistoryKind::SessionProposal
            ]
        );
        assert!(
            log.entries()
                .windows(2)
                .all(|pair| pair[0].timestamp <= pair[1].timestamp)
        );
    }

    #[test]
    fn serializes_type_tag_in_snake_case() {
        let mut log = EventLog::new();
        log.append(HistoryKind::RequestRejected, json!({"id": 3}));

        let value = serde_json::to_value(log.last().unwrap()).unwrap();
        assert_eq!(value["type"], "request_rejected");
        assert_eq!(value["context"]["id"], 3);
        assert!(value["timestamp"].is_string());
    }
}
