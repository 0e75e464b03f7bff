//! Error taxonomy for the consent ledger pipeline.
//!
//! Startup errors (`ConfigError`, `AbiError`) are fatal; everything else is
//! scoped to a single channel or a single event and never crosses those
//! boundaries.

use thiserror::Error;

/// Errors raised while loading or resolving the contract interface.
/// Fatal at startup.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("failed to read contract interface: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse contract interface: {0}")]
    Parse(String),

    #[error("event '{name}' not found in contract interface")]
    EventMissing { name: String },
}

/// Errors raised while decoding a single raw log.
///
/// Decoding is deterministic: a failed log will fail again, so callers log
/// and drop the event instead of retrying.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log carries {got} topics, expected at least 3 (signature + patient + researcher)")]
    MissingTopics { got: usize },

    #[error("invalid indexed topic: {reason}")]
    InvalidTopic { reason: String },

    #[error("ABI decode of data payload failed: {reason} (data: {data_hex})")]
    AbiDecodeFailed { reason: String, data_hex: String },
}

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the event listener and its WebSocket transport.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("WebSocket connection failed: {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("failed to open log subscription for {event}: {reason}")]
    SubscribeFailed { event: String, reason: String },

    #[error("node returned RPC error: {message}")]
    Rpc { message: String },

    #[error("subscription stream closed unexpectedly")]
    StreamClosed,

    #[error(transparent)]
    Abi(#[from] AbiError),
}

/// Errors raised while assembling the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {name} is not set")]
    MissingVar { name: &'static str },

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}
