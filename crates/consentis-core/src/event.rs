//! Raw and decoded registry event types.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::model::ConsentStatus;

/// The two event kinds emitted by the ConsentRegistry contract.
///
/// Closed set, matched exhaustively wherever consent state is derived from
/// an event — there is deliberately no string-keyed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Granted,
    Revoked,
}

impl EventKind {
    /// Every kind the listener subscribes to, one channel each.
    pub const ALL: [EventKind; 2] = [EventKind::Granted, EventKind::Revoked];

    /// The event name as it appears in the contract interface.
    pub fn event_name(&self) -> &'static str {
        match self {
            EventKind::Granted => "ConsentGranted",
            EventKind::Revoked => "ConsentRevoked",
        }
    }

    /// The consent status this event kind resolves to.
    pub fn status(&self) -> ConsentStatus {
        match self {
            EventKind::Granted => ConsentStatus::Granted,
            EventKind::Revoked => ConsentStatus::Revoked,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

/// A raw, undecoded log as delivered by an `eth_subscription` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    /// Contract address that emitted the log (hex, 0x-prefixed).
    pub address: String,
    /// topics[0] is the event signature hash; topics[1..] are indexed params.
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed parameters.
    pub data: Vec<u8>,
    /// Transaction hash (hex, 0x-prefixed).
    pub tx_hash: String,
    /// Block number the log landed in.
    pub block_number: u64,
    /// `true` if the log was removed by a reorg.
    pub removed: bool,
}

impl RawLog {
    /// Returns topics[0] as the event signature, if present.
    pub fn signature_topic(&self) -> Option<&str> {
        self.topics.first().map(|s| s.as_str())
    }

    /// The data payload as a 0x-prefixed hex string, for diagnostics.
    pub fn data_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.data))
    }
}

/// A fully decoded consent registry event.
///
/// Immutable; produced by the decoder from exactly one raw log and consumed
/// once by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentEvent {
    pub kind: EventKind,
    pub patient: Address,
    pub researcher: Address,
    pub record_id: String,
    pub tx_hash: String,
    pub block_number: u64,
}
