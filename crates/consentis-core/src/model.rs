//! Persisted domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consent state for one (record, researcher) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    Granted,
    Revoked,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Granted => "granted",
            ConsentStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConsentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "granted" => Ok(ConsentStatus::Granted),
            "revoked" => Ok(ConsentStatus::Revoked),
            other => Err(format!("unknown consent status: {other}")),
        }
    }
}

/// One row of the consent ledger.
///
/// Unique per (record_id, researcher_address); `status` reflects the most
/// recently *processed* event for the pair, which under cross-stream racing
/// is arrival order, not chain order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub record_id: String,
    pub researcher_address: String,
    pub status: ConsentStatus,
    pub last_tx_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// Role attached to a wallet address. Immutable once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Patient,
    Researcher,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Patient => "patient",
            UserRole::Researcher => "researcher",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(UserRole::Patient),
            "researcher" => Ok(UserRole::Researcher),
            other => Err(format!("unknown user role: {other}")),
        }
    }
}

/// A known wallet, shared with the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub wallet_address: String,
    pub role: UserRole,
}

/// Encrypted health record metadata uploaded by a patient.
///
/// The payload itself lives on IPFS; only the pointer and the access
/// conditions are persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub patient_address: String,
    pub name: String,
    pub ipfs_cid: String,
    pub data_to_encrypt_hash: String,
    pub access_conditions: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Public researcher profile attached to a researcher user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearcherProfile {
    pub wallet_address: String,
    pub full_name: String,
    pub institution: String,
    pub department: Option<String>,
    pub professional_email: String,
    pub credentials_url: Option<String>,
    pub bio: Option<String>,
}
