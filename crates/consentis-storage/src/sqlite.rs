//! SQLite storage backend.
//!
//! Persists the consent ledger, users, record metadata, and researcher
//! profiles to a single SQLite file. Uses `sqlx` with WAL mode for
//! concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use consentis_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./consentis.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use consentis_core::error::StorageError;
use consentis_core::model::{
    ConsentRecord, ConsentStatus, HealthRecord, ResearcherProfile, User, UserRole,
};

use crate::ConsentStore;

/// SQLite-backed consent ledger.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./consentis.db"`) or a full
    /// SQLite URL (`"sqlite:./consentis.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests. The pool
    /// is capped at one connection so every query sees the same database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS consents (
                record_id          TEXT NOT NULL,
                researcher_address TEXT NOT NULL,
                status             TEXT NOT NULL,
                last_tx_hash       TEXT NOT NULL,
                updated_at         TEXT NOT NULL,
                PRIMARY KEY (record_id, researcher_address)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                wallet_address TEXT PRIMARY KEY,
                role           TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_address      TEXT NOT NULL,
                name                 TEXT NOT NULL,
                ipfs_cid             TEXT NOT NULL,
                data_to_encrypt_hash TEXT NOT NULL,
                access_conditions    TEXT NOT NULL,
                created_at           TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS researcher_profiles (
                wallet_address     TEXT PRIMARY KEY,
                full_name          TEXT NOT NULL,
                institution        TEXT NOT NULL,
                department         TEXT,
                professional_email TEXT NOT NULL,
                credentials_url    TEXT,
                bio                TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_consents_researcher
             ON consents (researcher_address);",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_patient
             ON records (patient_address);",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> HealthRecord {
    let access_str: String = row.get("access_conditions");
    HealthRecord {
        patient_address: row.get("patient_address"),
        name: row.get("name"),
        ipfs_cid: row.get("ipfs_cid"),
        data_to_encrypt_hash: row.get("data_to_encrypt_hash"),
        access_conditions: serde_json::from_str(&access_str).unwrap_or(serde_json::Value::Null),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}

fn consent_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ConsentRecord, StorageError> {
    let status: String = row.get("status");
    Ok(ConsentRecord {
        record_id: row.get("record_id"),
        researcher_address: row.get("researcher_address"),
        status: status.parse().map_err(StorageError::Database)?,
        last_tx_hash: row.get("last_tx_hash"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[async_trait]
impl ConsentStore for SqliteStore {
    async fn upsert_consent(
        &self,
        record_id: &str,
        researcher_address: &str,
        status: ConsentStatus,
        tx_hash: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO consents (record_id, researcher_address, status, last_tx_hash, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (record_id, researcher_address)
             DO UPDATE SET
                status       = excluded.status,
                last_tx_hash = excluded.last_tx_hash,
                updated_at   = excluded.updated_at",
        )
        .bind(record_id)
        .bind(researcher_address)
        .bind(status.as_str())
        .bind(tx_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        debug!(record_id, researcher = researcher_address, %status, "consent row upserted");
        Ok(())
    }

    async fn upsert_user(&self, wallet_address: &str, role: UserRole) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO users (wallet_address, role) VALUES (?, ?)
             ON CONFLICT (wallet_address) DO NOTHING",
        )
        .bind(wallet_address)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_consent(
        &self,
        record_id: &str,
        researcher_address: &str,
    ) -> Result<Option<ConsentRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT record_id, researcher_address, status, last_tx_hash, updated_at
             FROM consents WHERE record_id = ? AND researcher_address = ?",
        )
        .bind(record_id)
        .bind(researcher_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        row.as_ref().map(consent_from_row).transpose()
    }

    async fn consents_for_researcher(
        &self,
        researcher_address: &str,
    ) -> Result<Vec<ConsentRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT record_id, researcher_address, status, last_tx_hash, updated_at
             FROM consents WHERE researcher_address = ? ORDER BY record_id",
        )
        .bind(researcher_address)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        rows.iter().map(consent_from_row).collect()
    }

    async fn get_user(&self, wallet_address: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query("SELECT wallet_address, role FROM users WHERE wallet_address = ?")
            .bind(wallet_address)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        row.map(|r| {
            let role: String = r.get("role");
            Ok(User {
                wallet_address: r.get("wallet_address"),
                role: role.parse().map_err(StorageError::Database)?,
            })
        })
        .transpose()
    }

    async fn insert_record(&self, record: &HealthRecord) -> Result<(), StorageError> {
        let access_json = serde_json::to_string(&record.access_conditions)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "INSERT INTO users (wallet_address, role) VALUES (?, 'patient')
             ON CONFLICT (wallet_address) DO NOTHING",
        )
        .bind(&record.patient_address)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "INSERT INTO records
                (patient_address, name, ipfs_cid, data_to_encrypt_hash, access_conditions, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.patient_address)
        .bind(&record.name)
        .bind(&record.ipfs_cid)
        .bind(&record.data_to_encrypt_hash)
        .bind(&access_json)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    async fn records_for_patient(
        &self,
        patient_address: &str,
    ) -> Result<Vec<HealthRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT patient_address, name, ipfs_cid, data_to_encrypt_hash,
                    access_conditions, created_at
             FROM records WHERE patient_address = ? ORDER BY created_at",
        )
        .bind(patient_address)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn list_records(&self) -> Result<Vec<HealthRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT patient_address, name, ipfs_cid, data_to_encrypt_hash,
                    access_conditions, created_at
             FROM records ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn upsert_researcher_profile(
        &self,
        profile: &ResearcherProfile,
    ) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "INSERT INTO users (wallet_address, role) VALUES (?, 'researcher')
             ON CONFLICT (wallet_address) DO NOTHING",
        )
        .bind(&profile.wallet_address)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            "INSERT INTO researcher_profiles
                (wallet_address, full_name, institution, department,
                 professional_email, credentials_url, bio)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (wallet_address)
             DO UPDATE SET
                full_name          = excluded.full_name,
                institution        = excluded.institution,
                department         = excluded.department,
                professional_email = excluded.professional_email,
                credentials_url    = excluded.credentials_url,
                bio                = excluded.bio",
        )
        .bind(&profile.wallet_address)
        .bind(&profile.full_name)
        .bind(&profile.institution)
        .bind(&profile.department)
        .bind(&profile.professional_email)
        .bind(&profile.credentials_url)
        .bind(&profile.bio)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_researcher_profile(
        &self,
        wallet_address: &str,
    ) -> Result<Option<ResearcherProfile>, StorageError> {
        let row = sqlx::query(
            "SELECT wallet_address, full_name, institution, department,
                    professional_email, credentials_url, bio
             FROM researcher_profiles WHERE wallet_address = ?",
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(row.map(|r| ResearcherProfile {
            wallet_address: r.get("wallet_address"),
            full_name: r.get("full_name"),
            institution: r.get("institution"),
            department: r.get("department"),
            professional_email: r.get("professional_email"),
            credentials_url: r.get("credentials_url"),
            bio: r.get("bio"),
        }))
    }

    async fn update_researcher_profile(
        &self,
        profile: &ResearcherProfile,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE researcher_profiles SET
                full_name          = ?,
                institution        = ?,
                department         = ?,
                professional_email = ?,
                credentials_url    = ?,
                bio                = ?
             WHERE wallet_address = ?",
        )
        .bind(&profile.full_name)
        .bind(&profile.institution)
        .bind(&profile.department)
        .bind(&profile.professional_email)
        .bind(&profile.credentials_url)
        .bind(&profile.bio)
        .bind(&profile.wallet_address)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_email_taken_by_other(
        &self,
        email: &str,
        wallet_address: &str,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT 1 FROM researcher_profiles
             WHERE professional_email = ? AND wallet_address <> ? LIMIT 1",
        )
        .bind(email)
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(row.is_some())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
