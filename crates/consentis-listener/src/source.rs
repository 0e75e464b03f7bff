//! The log source seam.
//!
//! The supervisor and channels only see [`LogSource`]; production wires in
//! [`crate::EvmWsClient`], tests wire in scripted fakes.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tokio::sync::mpsc;

use consentis_core::error::ListenerError;
use consentis_core::event::RawLog;

/// A live log subscription.
///
/// `logs` carries raw log notifications in arrival order; `errors` is
/// signalled at most once, when the underlying stream dies. Both closing
/// without an error also means the stream is gone.
pub struct LogSubscription {
    /// Node-assigned subscription id, for log correlation.
    pub id: String,
    pub logs: mpsc::Receiver<RawLog>,
    pub errors: mpsc::Receiver<ListenerError>,
}

/// Something that can open filtered log subscriptions.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Subscribe to logs emitted by `contract` whose first topic is
    /// `topic0`. Each call opens an independent subscription.
    async fn subscribe_logs(
        &self,
        contract: Address,
        topic0: B256,
    ) -> Result<LogSubscription, ListenerError>;
}
