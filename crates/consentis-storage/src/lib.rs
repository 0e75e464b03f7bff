//! consentis-storage — persistence for the consent ledger.
//!
//! One trait, three backends:
//! - [`MemoryStore`] (feature `memory`, default) — HashMaps behind a mutex,
//!   for tests and short-lived processes.
//! - `SqliteStore` (feature `sqlite`) — single-file sqlx/SQLite with WAL.
//! - `PgStore` (feature `postgres`) — pooled sqlx/Postgres for production.
//!
//! The consent upsert is idempotent and last-write-wins: subscriptions can
//! redeliver logs after reconnection, and grant/revoke arrive on separate
//! streams with no cross-stream ordering.

use async_trait::async_trait;

use consentis_core::error::StorageError;
use consentis_core::model::{
    ConsentRecord, ConsentStatus, HealthRecord, ResearcherProfile, User, UserRole,
};

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// The persistence collaborator for consents, users, records, and profiles.
///
/// Each call is atomic on its own; the backend serialises conflicting
/// writes, so concurrent subscription channels need no extra locking.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Insert a consent row, or overwrite status/last_tx_hash/updated_at
    /// unconditionally if the (record_id, researcher) pair already exists.
    async fn upsert_consent(
        &self,
        record_id: &str,
        researcher_address: &str,
        status: ConsentStatus,
        tx_hash: &str,
    ) -> Result<(), StorageError>;

    /// Ensure a user row exists for `wallet_address`. Insert-or-ignore: an
    /// existing row keeps its role, whatever it is.
    async fn upsert_user(&self, wallet_address: &str, role: UserRole) -> Result<(), StorageError>;

    async fn get_consent(
        &self,
        record_id: &str,
        researcher_address: &str,
    ) -> Result<Option<ConsentRecord>, StorageError>;

    async fn consents_for_researcher(
        &self,
        researcher_address: &str,
    ) -> Result<Vec<ConsentRecord>, StorageError>;

    async fn get_user(&self, wallet_address: &str) -> Result<Option<User>, StorageError>;

    /// Persist record metadata, ensuring a patient user row exists for the
    /// uploader in the same transaction.
    async fn insert_record(&self, record: &HealthRecord) -> Result<(), StorageError>;

    async fn records_for_patient(
        &self,
        patient_address: &str,
    ) -> Result<Vec<HealthRecord>, StorageError>;

    /// All record metadata, oldest first.
    async fn list_records(&self) -> Result<Vec<HealthRecord>, StorageError>;

    /// Create or refresh a researcher profile; the user row is upgraded to
    /// role researcher if it does not exist yet.
    async fn upsert_researcher_profile(
        &self,
        profile: &ResearcherProfile,
    ) -> Result<(), StorageError>;

    async fn get_researcher_profile(
        &self,
        wallet_address: &str,
    ) -> Result<Option<ResearcherProfile>, StorageError>;

    /// Overwrite an existing researcher profile. Returns `false` when no
    /// profile exists for the wallet; nothing is created in that case.
    async fn update_researcher_profile(
        &self,
        profile: &ResearcherProfile,
    ) -> Result<bool, StorageError>;

    /// True when `email` is the professional email of a researcher profile
    /// belonging to a wallet other than `wallet_address`.
    async fn is_email_taken_by_other(
        &self,
        email: &str,
        wallet_address: &str,
    ) -> Result<bool, StorageError>;
}
