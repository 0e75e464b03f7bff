//! In-memory storage backend.
//!
//! All data is lost when the process exits. Useful for tests and for
//! running the listener against a throwaway chain.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use consentis_core::error::StorageError;
use consentis_core::model::{
    ConsentRecord, ConsentStatus, HealthRecord, ResearcherProfile, User, UserRole,
};

use crate::ConsentStore;

/// In-memory consent ledger.
#[derive(Default)]
pub struct MemoryStore {
    consents: Mutex<HashMap<(String, String), ConsentRecord>>,
    users: Mutex<HashMap<String, User>>,
    records: Mutex<Vec<HealthRecord>>,
    profiles: Mutex<HashMap<String, ResearcherProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of consent rows, across all pairs.
    pub fn consent_count(&self) -> usize {
        self.consents.lock().unwrap().len()
    }
}

#[async_trait]
impl ConsentStore for MemoryStore {
    async fn upsert_consent(
        &self,
        record_id: &str,
        researcher_address: &str,
        status: ConsentStatus,
        tx_hash: &str,
    ) -> Result<(), StorageError> {
        let key = (record_id.to_string(), researcher_address.to_string());
        self.consents.lock().unwrap().insert(
            key,
            ConsentRecord {
                record_id: record_id.to_string(),
                researcher_address: researcher_address.to_string(),
                status,
                last_tx_hash: tx_hash.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn upsert_user(&self, wallet_address: &str, role: UserRole) -> Result<(), StorageError> {
        self.users
            .lock()
            .unwrap()
            .entry(wallet_address.to_string())
            .or_insert(User {
                wallet_address: wallet_address.to_string(),
                role,
            });
        Ok(())
    }

    async fn get_consent(
        &self,
        record_id: &str,
        researcher_address: &str,
    ) -> Result<Option<ConsentRecord>, StorageError> {
        let key = (record_id.to_string(), researcher_address.to_string());
        Ok(self.consents.lock().unwrap().get(&key).cloned())
    }

    async fn consents_for_researcher(
        &self,
        researcher_address: &str,
    ) -> Result<Vec<ConsentRecord>, StorageError> {
        let mut rows: Vec<_> = self
            .consents
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.researcher_address == researcher_address)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        Ok(rows)
    }

    async fn get_user(&self, wallet_address: &str) -> Result<Option<User>, StorageError> {
        Ok(self.users.lock().unwrap().get(wallet_address).cloned())
    }

    async fn insert_record(&self, record: &HealthRecord) -> Result<(), StorageError> {
        self.upsert_user(&record.patient_address, UserRole::Patient)
            .await?;
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn records_for_patient(
        &self,
        patient_address: &str,
    ) -> Result<Vec<HealthRecord>, StorageError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.patient_address == patient_address)
            .cloned()
            .collect())
    }

    async fn list_records(&self) -> Result<Vec<HealthRecord>, StorageError> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn upsert_researcher_profile(
        &self,
        profile: &ResearcherProfile,
    ) -> Result<(), StorageError> {
        self.upsert_user(&profile.wallet_address, UserRole::Researcher)
            .await?;
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.wallet_address.clone(), profile.clone());
        Ok(())
    }

    async fn get_researcher_profile(
        &self,
        wallet_address: &str,
    ) -> Result<Option<ResearcherProfile>, StorageError> {
        Ok(self.profiles.lock().unwrap().get(wallet_address).cloned())
    }

    async fn update_researcher_profile(
        &self,
        profile: &ResearcherProfile,
    ) -> Result<bool, StorageError> {
        let mut profiles = self.profiles.lock().unwrap();
        if !profiles.contains_key(&profile.wallet_address) {
            return Ok(false);
        }
        profiles.insert(profile.wallet_address.clone(), profile.clone());
        Ok(true)
    }

    async fn is_email_taken_by_other(
        &self,
        email: &str,
        wallet_address: &str,
    ) -> Result<bool, StorageError> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .values()
            .any(|p| p.professional_email == email && p.wallet_address != wallet_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESEARCHER: &str = "0x2222222222222222222222222222222222222222";

    #[tokio::test]
    async fn upsert_consent_is_idempotent() {
        let store = MemoryStore::new();
        store
            .upsert_consent("rec-1", RESEARCHER, ConsentStatus::Granted, "0xa")
            .await
            .unwrap();
        store
            .upsert_consent("rec-1", RESEARCHER, ConsentStatus::Granted, "0xa")
            .await
            .unwrap();

        assert_eq!(store.consent_count(), 1);
        let row = store.get_consent("rec-1", RESEARCHER).await.unwrap().unwrap();
        assert_eq!(row.status, ConsentStatus::Granted);
        assert_eq!(row.last_tx_hash, "0xa");
    }

    #[tokio::test]
    async fn consent_is_last_write_wins() {
        let store = MemoryStore::new();
        store
            .upsert_consent("rec-1", RESEARCHER, ConsentStatus::Granted, "0xa")
            .await
            .unwrap();
        store
            .upsert_consent("rec-1", RESEARCHER, ConsentStatus::Revoked, "0xb")
            .await
            .unwrap();

        let row = store.get_consent("rec-1", RESEARCHER).await.unwrap().unwrap();
        assert_eq!(row.status, ConsentStatus::Revoked);
        assert_eq!(row.last_tx_hash, "0xb");
        assert_eq!(store.consent_count(), 1);
    }

    #[tokio::test]
    async fn user_role_is_never_overwritten() {
        let store = MemoryStore::new();
        store.upsert_user("0xabc", UserRole::Patient).await.unwrap();
        store.upsert_user("0xabc", UserRole::Researcher).await.unwrap();

        let user = store.get_user("0xabc").await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::Patient);
    }

    #[tokio::test]
    async fn record_insert_creates_patient_user() {
        let store = MemoryStore::new();
        let record = HealthRecord {
            patient_address: "0xpat".into(),
            name: "blood-panel".into(),
            ipfs_cid: "QmTest".into(),
            data_to_encrypt_hash: "0xhash".into(),
            access_conditions: serde_json::json!([{"chain": "ethereum"}]),
            created_at: Utc::now(),
        };
        store.insert_record(&record).await.unwrap();

        assert_eq!(
            store.get_user("0xpat").await.unwrap().unwrap().role,
            UserRole::Patient
        );
        assert_eq!(store.records_for_patient("0xpat").await.unwrap().len(), 1);
        assert_eq!(store.list_records().await.unwrap().len(), 1);
    }

    fn profile(wallet: &str, email: &str) -> ResearcherProfile {
        ResearcherProfile {
            wallet_address: wallet.into(),
            full_name: "Ada Lovelace".into(),
            institution: "AEI".into(),
            department: None,
            professional_email: email.into(),
            credentials_url: None,
            bio: None,
        }
    }

    #[tokio::test]
    async fn profile_update_requires_an_existing_row() {
        let store = MemoryStore::new();
        let updated = store
            .update_researcher_profile(&profile(RESEARCHER, "ada@aei.example"))
            .await
            .unwrap();
        assert!(!updated);
        assert!(store
            .get_researcher_profile(RESEARCHER)
            .await
            .unwrap()
            .is_none());

        store
            .upsert_researcher_profile(&profile(RESEARCHER, "ada@aei.example"))
            .await
            .unwrap();
        let mut changed = profile(RESEARCHER, "lovelace@aei.example");
        changed.institution = "Analytical Engine Institute".into();
        assert!(store.update_researcher_profile(&changed).await.unwrap());

        let loaded = store
            .get_researcher_profile(RESEARCHER)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.institution, "Analytical Engine Institute");
        assert_eq!(loaded.professional_email, "lovelace@aei.example");
    }

    #[tokio::test]
    async fn email_taken_only_counts_other_wallets() {
        let store = MemoryStore::new();
        store
            .upsert_researcher_profile(&profile(RESEARCHER, "ada@aei.example"))
            .await
            .unwrap();

        // Same wallet keeping its own email is fine.
        assert!(!store
            .is_email_taken_by_other("ada@aei.example", RESEARCHER)
            .await
            .unwrap());
        // Another wallet claiming it is not.
        assert!(store
            .is_email_taken_by_other(
                "ada@aei.example",
                "0x3333333333333333333333333333333333333333"
            )
            .await
            .unwrap());
        assert!(!store
            .is_email_taken_by_other("free@aei.example", RESEARCHER)
            .await
            .unwrap());
    }
}
