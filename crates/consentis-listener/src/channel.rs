//! Per-subscription processing loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use consentis_abi::ConsentRegistryAbi;
use consentis_core::event::{EventKind, RawLog};

use crate::reconciler::Reconciler;
use crate::source::LogSubscription;

/// Why a channel's run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelExit {
    /// Shutdown was requested; the stream was still healthy.
    Cancelled,
    /// The subscription stream died. Terminal: the channel does not
    /// resubscribe.
    Failed,
}

/// Drains one log subscription: decode, reconcile, repeat.
///
/// Logs are processed strictly one at a time; the bounded subscription
/// channel provides backpressure toward the socket task. A log that fails
/// to decode or to persist is logged and skipped, never retried.
pub struct SubscriptionChannel {
    kind: EventKind,
    abi: Arc<ConsentRegistryAbi>,
    reconciler: Reconciler,
}

impl SubscriptionChannel {
    pub fn new(kind: EventKind, abi: Arc<ConsentRegistryAbi>, reconciler: Reconciler) -> Self {
        Self {
            kind,
            abi,
            reconciler,
        }
    }

    /// Process the subscription until cancellation or stream death.
    ///
    /// Cancellation takes priority over buffered work: once the token is
    /// cancelled, no further log is decoded or persisted. A stream error is
    /// terminal, but logs the socket task delivered before it are still
    /// applied first.
    pub async fn run(self, token: CancellationToken, mut sub: LogSubscription) -> ChannelExit {
        let event = self.kind.event_name();
        debug!(event, sub_id = %sub.id, "subscription channel streaming");

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!(event, "subscription channel cancelled");
                    return ChannelExit::Cancelled;
                }

                err = sub.errors.recv() => {
                    match err {
                        Some(e) => warn!(event, error = %e, "subscription stream failed"),
                        None => warn!(event, "subscription stream closed"),
                    }
                    // The socket task enqueues every log before it signals
                    // the failure, so whatever is buffered was genuinely
                    // delivered and must not be discarded.
                    while let Ok(log) = sub.logs.try_recv() {
                        if token.is_cancelled() {
                            break;
                        }
                        self.process(log).await;
                    }
                    return ChannelExit::Failed;
                }

                log = sub.logs.recv() => {
                    let Some(log) = log else {
                        warn!(event, "subscription log channel closed");
                        return ChannelExit::Failed;
                    };
                    self.process(log).await;
                }
            }
        }
    }

    /// Decode and reconcile one delivered log. Reorged, undecodable, and
    /// unpersistable logs are dropped with a diagnostic, never retried.
    async fn process(&self, log: RawLog) {
        let event = self.kind.event_name();

        if log.removed {
            debug!(event, tx = %log.tx_hash, "skipping reorged log");
            return;
        }

        let decoded = match self.abi.decode_log(&log, self.kind) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    event,
                    error = %e,
                    tx = %log.tx_hash,
                    payload = %log.data_hex(),
                    "dropping undecodable log"
                );
                return;
            }
        };

        if let Err(e) = self.reconciler.apply(&decoded).await {
            error!(
                event,
                error = %e,
                record_id = %decoded.record_id,
                tx = %decoded.tx_hash,
                "failed to persist consent event"
            );
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
