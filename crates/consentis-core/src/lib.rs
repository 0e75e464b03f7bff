//! consentis-core — shared types for the Consentis consent ledger.
//!
//! # Architecture
//!
//! ```text
//! cli ──► EventListener (supervisor)
//!             ├── SubscriptionChannel ×2   (one per EventKind)
//!             │       ├── ConsentRegistryAbi (decode)
//!             │       └── Reconciler ──► ConsentStore
//!             └── EvmWsClient              (shared connection)
//! ```
//!
//! This crate holds the vocabulary the other crates speak: raw and decoded
//! event types, the persisted domain models, the error taxonomy, and the
//! startup configuration.

pub mod config;
pub mod error;
pub mod event;
pub mod model;

pub use config::AppConfig;
pub use error::{AbiError, ConfigError, DecodeError, ListenerError, StorageError};
pub use event::{ConsentEvent, EventKind, RawLog};
pub use model::{ConsentRecord, ConsentStatus, HealthRecord, ResearcherProfile, User, UserRole};
