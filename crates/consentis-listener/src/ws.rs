//! WebSocket JSON-RPC log source.
//!
//! One connection, one background task. The task owns the socket, correlates
//! `eth_subscribe` requests with their responses through a pending map, and
//! dispatches `eth_subscription` notifications into per-subscription bounded
//! channels by subscription id.
//!
//! The connection is not re-established: when the socket dies, every live
//! subscription's error channel is signalled once and the task ends. Stream
//! recovery is the operator's concern (restart the process).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use consentis_core::error::ListenerError;
use consentis_core::event::RawLog;

use crate::source::{LogSource, LogSubscription};

/// Logs queued per subscription before the socket task blocks.
const LOG_CHANNEL_CAPACITY: usize = 512;

/// Command sent from callers to the background socket task.
enum WsCommand {
    Subscribe {
        id: u64,
        filter: Value,
        log_tx: mpsc::Sender<RawLog>,
        err_tx: mpsc::Sender<ListenerError>,
        reply: oneshot::Sender<Result<String, ListenerError>>,
    },
    Close,
}

/// A subscribe request awaiting its JSON-RPC response.
struct PendingSubscribe {
    log_tx: mpsc::Sender<RawLog>,
    err_tx: mpsc::Sender<ListenerError>,
    reply: oneshot::Sender<Result<String, ListenerError>>,
}

/// A confirmed subscription's dispatch channels.
struct SubEntry {
    log_tx: mpsc::Sender<RawLog>,
    err_tx: mpsc::Sender<ListenerError>,
}

/// Ethereum WebSocket client speaking `eth_subscribe("logs", ...)`.
pub struct EvmWsClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    req_id: AtomicU64,
}

impl EvmWsClient {
    /// Connect to `url` and start the background socket task.
    pub async fn connect(url: impl Into<String>) -> Result<Self, ListenerError> {
        let url = url.into();

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.map_err(|e| {
            ListenerError::ConnectionFailed {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;
        info!(url = %url, "WebSocket connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(ws_task(ws_stream, cmd_rx));

        Ok(Self {
            url,
            cmd_tx,
            req_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for EvmWsClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl LogSource for EvmWsClient {
    async fn subscribe_logs(
        &self,
        contract: Address,
        topic0: B256,
    ) -> Result<LogSubscription, ListenerError> {
        let (log_tx, log_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);
        let (reply_tx, reply_rx) = oneshot::channel();

        let filter = serde_json::json!({
            "address": [contract.to_string()],
            "topics": [[format!("0x{}", hex::encode(topic0))]],
        });

        self.cmd_tx
            .send(WsCommand::Subscribe {
                id: self.req_id.fetch_add(1, Ordering::Relaxed),
                filter,
                log_tx,
                err_tx,
                reply: reply_tx,
            })
            .map_err(|_| ListenerError::StreamClosed)?;

        let id = reply_rx.await.map_err(|_| ListenerError::StreamClosed)??;

        Ok(LogSubscription {
            id,
            logs: log_rx,
            errors: err_rx,
        })
    }
}

// ─── Background socket task ──────────────────────────────────────────────────

async fn ws_task(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let mut pending: HashMap<u64, PendingSubscribe> = HashMap::new();
    let mut subs: HashMap<String, SubEntry> = HashMap::new();

    // Some(message) when the socket died with an RPC-level error.
    let exit_reason: Option<String> = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(WsCommand::Close) => return,
                    Some(WsCommand::Subscribe { id, filter, log_tx, err_tx, reply }) => {
                        let req = serde_json::json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "method": "eth_subscribe",
                            "params": ["logs", filter],
                        });
                        pending.insert(id, PendingSubscribe { log_tx, err_tx, reply });
                        if sink.send(Message::Text(req.to_string().into())).await.is_err() {
                            break None;
                        }
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break None,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error");
                        break Some(e.to_string());
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Some((sub_id, log)) = parse_log_notification(&text) {
                            if let Some(entry) = subs.get(&sub_id) {
                                if entry.log_tx.send(log).await.is_err() {
                                    // Receiver gone; forget the subscription.
                                    subs.remove(&sub_id);
                                }
                            } else {
                                debug!(sub_id, "log for unknown subscription");
                            }
                        } else if let Some((id, result)) = parse_subscribe_response(&text) {
                            if let Some(p) = pending.remove(&id) {
                                match result {
                                    Ok(sub_id) => {
                                        subs.insert(sub_id.clone(), SubEntry {
                                            log_tx: p.log_tx,
                                            err_tx: p.err_tx,
                                        });
                                        let _ = p.reply.send(Ok(sub_id));
                                    }
                                    Err(message) => {
                                        let _ = p.reply.send(Err(ListenerError::Rpc { message }));
                                    }
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by server");
                        break None;
                    }
                    Some(Ok(_)) => {} // binary / pong
                }
            }
        }
    };

    // Terminal: tell everyone waiting, then end. No reconnect.
    for (_, p) in pending.drain() {
        let _ = p.reply.send(Err(ListenerError::StreamClosed));
    }
    for (_, entry) in subs.drain() {
        let err = match &exit_reason {
            Some(message) => ListenerError::Rpc {
                message: message.clone(),
            },
            None => ListenerError::StreamClosed,
        };
        let _ = entry.err_tx.try_send(err);
    }
    info!("WebSocket task ended");
}

// ─── Message parsing ─────────────────────────────────────────────────────────

/// Parse an `eth_subscription` notification into its subscription id and raw
/// log. Returns `None` for anything else (responses, malformed payloads).
fn parse_log_notification(text: &str) -> Option<(String, RawLog)> {
    let v: Value = serde_json::from_str(text).ok()?;
    if v.get("method")?.as_str()? != "eth_subscription" {
        return None;
    }

    let params = v.get("params")?;
    let sub_id = params.get("subscription")?.as_str()?.to_string();
    let result = params.get("result")?;

    let address = result.get("address")?.as_str()?.to_string();
    let topics: Vec<String> = result
        .get("topics")?
        .as_array()?
        .iter()
        .filter_map(|t| t.as_str().map(String::from))
        .collect();

    let data_hex = result.get("data").and_then(|d| d.as_str()).unwrap_or("0x");
    let data = hex::decode(data_hex.strip_prefix("0x").unwrap_or(data_hex)).unwrap_or_default();

    Some((
        sub_id,
        RawLog {
            address,
            topics,
            data,
            tx_hash: result
                .get("transactionHash")
                .and_then(|t| t.as_str())
                .unwrap_or("0x0")
                .to_string(),
            block_number: hex_to_u64(result.get("blockNumber").and_then(|b| b.as_str())),
            removed: result
                .get("removed")
                .and_then(|r| r.as_bool())
                .unwrap_or(false),
        },
    ))
}

/// Parse a JSON-RPC response to `eth_subscribe`: either the subscription id
/// or the node's error message.
fn parse_subscribe_response(text: &str) -> Option<(u64, Result<String, String>)> {
    let v: Value = serde_json::from_str(text).ok()?;
    let id = v.get("id")?.as_u64()?;

    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown RPC error")
            .to_string();
        return Some((id, Err(message)));
    }

    let sub_id = v.get("result")?.as_str()?.to_string();
    Some((id, Ok(sub_id)))
}

fn hex_to_u64(s: Option<&str>) -> u64 {
    s.and_then(|h| u64::from_str_radix(h.strip_prefix("0x").unwrap_or(h), 16).ok())
        .unwrap_or(0)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
