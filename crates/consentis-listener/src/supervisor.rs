//! Listener supervision: one channel per event kind, shared ABI and store.

use std::sync::Arc;

use alloy_primitives::Address;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use consentis_abi::ConsentRegistryAbi;
use consentis_core::error::ListenerError;
use consentis_core::event::EventKind;
use consentis_storage::ConsentStore;

use crate::channel::{ChannelExit, SubscriptionChannel};
use crate::reconciler::Reconciler;
use crate::source::LogSource;

/// Owns the consent event pipeline: subscribes one channel per event kind
/// and runs them to completion.
pub struct EventListener {
    source: Arc<dyn LogSource>,
    abi: Arc<ConsentRegistryAbi>,
    store: Arc<dyn ConsentStore>,
    contract: Address,
}

impl EventListener {
    pub fn new(
        source: Arc<dyn LogSource>,
        abi: Arc<ConsentRegistryAbi>,
        store: Arc<dyn ConsentStore>,
        contract: Address,
    ) -> Self {
        Self {
            source,
            abi,
            store,
            contract,
        }
    }

    /// Subscribe both event streams and process them until `token` is
    /// cancelled.
    ///
    /// Any subscription failing to establish is fatal: already-running
    /// channels are cancelled and joined, then the error is returned so the
    /// process can exit. After startup, a single channel dying is logged
    /// but does not stop its sibling; `run` returns `Ok` only once
    /// cancellation has been observed and every channel task has joined.
    pub async fn run(&self, token: CancellationToken) -> Result<(), ListenerError> {
        let channel_token = token.child_token();
        let reconciler = Reconciler::new(self.store.clone());
        let mut handles: Vec<(EventKind, JoinHandle<ChannelExit>)> = Vec::new();

        for kind in EventKind::ALL {
            let sub = match self
                .source
                .subscribe_logs(self.contract, self.abi.topic0(kind))
                .await
            {
                Ok(sub) => sub,
                Err(e) => {
                    error!(event = kind.event_name(), error = %e, "failed to subscribe");
                    channel_token.cancel();
                    for (_, handle) in handles {
                        let _ = handle.await;
                    }
                    return Err(ListenerError::SubscribeFailed {
                        event: kind.event_name().to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            info!(
                event = kind.event_name(),
                sub_id = %sub.id,
                contract = %self.contract,
                "subscribed"
            );

            let channel =
                SubscriptionChannel::new(kind, self.abi.clone(), reconciler.clone());
            let child = channel_token.child_token();
            handles.push((kind, tokio::spawn(channel.run(child, sub))));
        }

        for (kind, handle) in handles {
            match handle.await {
                Ok(ChannelExit::Cancelled) => {
                    info!(event = kind.event_name(), "channel stopped")
                }
                Ok(ChannelExit::Failed) => {
                    warn!(event = kind.event_name(), "channel stream failed; not resubscribing")
                }
                Err(e) => error!(event = kind.event_name(), error = %e, "channel task panicked"),
            }
        }

        info!("event listener stopped");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LogSubscription;
    use alloy_primitives::B256;
    use async_trait::async_trait;
    use consentis_core::event::RawLog;
    use consentis_core::model::ConsentStatus;
    use consentis_storage::MemoryStore;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
    const PATIENT: &str = "0x1111111111111111111111111111111111111111";
    const RESEARCHER: &str = "0x2222222222222222222222222222222222222222";

    fn encode_record_id(s: &str) -> Vec<u8> {
        let mut out = vec![0u8; 32];
        out[31] = 0x20;
        let mut len = vec![0u8; 32];
        len[24..].copy_from_slice(&(s.len() as u64).to_be_bytes());
        out.extend(len);
        let mut bytes = s.as_bytes().to_vec();
        bytes.resize(s.len().div_ceil(32) * 32, 0);
        out.extend(bytes);
        out
    }

    fn sample_log(abi: &ConsentRegistryAbi, kind: EventKind, record_id: &str) -> RawLog {
        let topic = |a: &str| {
            let a = Address::from_str(a).unwrap();
            format!("0x{}", hex::encode(a.into_word()))
        };
        RawLog {
            address: CONTRACT.into(),
            topics: vec![
                format!("0x{}", hex::encode(abi.topic0(kind))),
                topic(PATIENT),
                topic(RESEARCHER),
            ],
            data: encode_record_id(record_id),
            tx_hash: "0xfeed".into(),
            block_number: 7,
            removed: false,
        }
    }

    /// Hands out pre-built subscriptions by topic0; fails topics it has no
    /// script for.
    struct ScriptedSource {
        subs: Mutex<HashMap<B256, LogSubscription>>,
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        async fn subscribe_logs(
            &self,
            _contract: Address,
            topic0: B256,
        ) -> Result<LogSubscription, ListenerError> {
            self.subs
                .lock()
                .unwrap()
                .remove(&topic0)
                .ok_or(ListenerError::Rpc {
                    message: "no such subscription".into(),
                })
        }
    }

    struct Feed {
        log_tx: mpsc::Sender<RawLog>,
        err_tx: mpsc::Sender<ListenerError>,
    }

    fn scripted(abi: &ConsentRegistryAbi, kinds: &[EventKind]) -> (ScriptedSource, Vec<Feed>) {
        let mut subs = HashMap::new();
        let mut feeds = Vec::new();
        for kind in kinds {
            let (log_tx, logs) = mpsc::channel(16);
            let (err_tx, errors) = mpsc::channel(1);
            subs.insert(
                abi.topic0(*kind),
                LogSubscription {
                    id: format!("0x{}", kind.event_name()),
                    logs,
                    errors,
                },
            );
            feeds.push(Feed { log_tx, err_tx });
        }
        (
            ScriptedSource {
                subs: Mutex::new(subs),
            },
            feeds,
        )
    }

    fn listener(source: ScriptedSource, store: Arc<MemoryStore>) -> EventListener {
        EventListener::new(
            Arc::new(source),
            Arc::new(ConsentRegistryAbi::bundled().unwrap()),
            store,
            Address::from_str(CONTRACT).unwrap(),
        )
    }

    async fn wait_for_consents(store: &MemoryStore, n: usize) {
        for _ in 0..200 {
            if store.consent_count() >= n {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("store never reached {n} consents");
    }

    #[tokio::test]
    async fn events_from_both_streams_reach_the_ledger() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let (source, feeds) = scripted(&abi, &EventKind::ALL);
        let store = Arc::new(MemoryStore::new());
        let listener = listener(source, store.clone());

        let token = CancellationToken::new();
        let run = tokio::spawn({
            let token = token.clone();
            async move { listener.run(token).await }
        });

        feeds[0]
            .log_tx
            .send(sample_log(&abi, EventKind::Granted, "rec-1"))
            .await
            .unwrap();
        feeds[1]
            .log_tx
            .send(sample_log(&abi, EventKind::Revoked, "rec-2"))
            .await
            .unwrap();

        wait_for_consents(&store, 2).await;
        let researcher = Address::from_str(RESEARCHER).unwrap().to_string();
        assert_eq!(
            store
                .get_consent("rec-1", &researcher)
                .await
                .unwrap()
                .unwrap()
                .status,
            ConsentStatus::Granted
        );
        assert_eq!(
            store
                .get_consent("rec-2", &researcher)
                .await
                .unwrap()
                .unwrap()
                .status,
            ConsentStatus::Revoked
        );

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn subscribe_failure_is_fatal() {
        // Only the granted stream has a script; the revoked subscribe fails.
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let (source, _feeds) = scripted(&abi, &[EventKind::Granted]);
        let store = Arc::new(MemoryStore::new());
        let listener = listener(source, store);

        let err = listener
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ListenerError::SubscribeFailed { event, .. } => {
                assert_eq!(event, "ConsentRevoked")
            }
            other => panic!("expected SubscribeFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_dead_stream_does_not_stop_the_other() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let (source, feeds) = scripted(&abi, &EventKind::ALL);
        let store = Arc::new(MemoryStore::new());
        let listener = listener(source, store.clone());

        let token = CancellationToken::new();
        let run = tokio::spawn({
            let token = token.clone();
            async move { listener.run(token).await }
        });

        // Kill the granted stream, then keep feeding the revoked one.
        drop(feeds[0].log_tx.clone());
        feeds[0]
            .err_tx
            .send(ListenerError::StreamClosed)
            .await
            .unwrap();

        feeds[1]
            .log_tx
            .send(sample_log(&abi, EventKind::Revoked, "rec-after"))
            .await
            .unwrap();

        wait_for_consents(&store, 1).await;

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_processing_before_return() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let (source, feeds) = scripted(&abi, &EventKind::ALL);
        let store = Arc::new(MemoryStore::new());
        let listener = listener(source, store.clone());

        let token = CancellationToken::new();
        let run = tokio::spawn({
            let token = token.clone();
            async move { listener.run(token).await }
        });

        token.cancel();
        run.await.unwrap().unwrap();

        // Channels have exited; a late log goes nowhere.
        let late = feeds[0].log_tx.send(sample_log(&abi, EventKind::Granted, "late"));
        assert!(late.await.is_err());
        assert_eq!(store.consent_count(), 0);
    }
}
