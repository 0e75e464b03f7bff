//! consentis-listener — on-chain consent event ingestion.
//!
//! One WebSocket connection to an Ethereum node carries two
//! `eth_subscribe("logs", ...)` subscriptions, one per consent event kind.
//! Each subscription feeds a [`SubscriptionChannel`] that decodes raw logs
//! and hands typed events to the [`Reconciler`], which writes the ledger.
//! The [`EventListener`] supervisor owns the channels' lifecycle and the
//! shutdown protocol.
//!
//! ```text
//!  EvmWsClient ──logs──▶ SubscriptionChannel(Granted) ──▶ Reconciler ──▶ store
//!       │                                                     ▲
//!       └──────logs──▶ SubscriptionChannel(Revoked) ──────────┘
//! ```
//!
//! A failed subscription stream is terminal for its channel; the sibling
//! channel keeps running. Failure to establish a subscription at startup is
//! fatal for the whole listener.

pub mod channel;
pub mod reconciler;
pub mod source;
pub mod supervisor;
pub mod ws;

pub use channel::{ChannelExit, SubscriptionChannel};
pub use reconciler::Reconciler;
pub use source::{LogSource, LogSubscription};
pub use supervisor::EventListener;
pub use ws::EvmWsClient;
