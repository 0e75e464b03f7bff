//! Event → ledger reconciliation.

use std::sync::Arc;

use tracing::info;

use consentis_core::error::StorageError;
use consentis_core::event::ConsentEvent;
use consentis_core::model::UserRole;
use consentis_storage::ConsentStore;

/// Applies decoded consent events to the store.
///
/// Idempotent by construction: the consent write is an unconditional upsert
/// keyed by (record_id, researcher), the user write is insert-or-ignore, so
/// replaying a log leaves the ledger unchanged.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ConsentStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ConsentStore>) -> Self {
        Self { store }
    }

    /// Write one event to the ledger.
    ///
    /// Both writes are attempted even if the first fails; the first error is
    /// the one reported. Addresses are persisted in EIP-55 checksum form.
    pub async fn apply(&self, event: &ConsentEvent) -> Result<(), StorageError> {
        let status = event.kind.status();
        let researcher = event.researcher.to_string();

        let consent = self
            .store
            .upsert_consent(&event.record_id, &researcher, status, &event.tx_hash)
            .await;
        let user = self.store.upsert_user(&researcher, UserRole::Researcher).await;

        if consent.is_ok() && user.is_ok() {
            info!(
                record_id = %event.record_id,
                researcher = %researcher,
                %status,
                tx = %event.tx_hash,
                block = event.block_number,
                "consent reconciled"
            );
        }

        match (consent, user) {
            (Err(e), _) => Err(e),
            (Ok(()), rest) => rest,
        }
    }
}
