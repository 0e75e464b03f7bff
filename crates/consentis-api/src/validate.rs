//! Request validation.

use std::str::FromStr;

use alloy_primitives::Address;

/// A wallet address: `0x` followed by 40 hex digits. Case-insensitive; no
/// checksum verification at the API boundary.
pub fn is_wallet_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse a wallet address and render it in EIP-55 checksum form.
///
/// The listener persists addresses checksummed, so every lookup and write
/// key must go through this to stay case-insensitive at the HTTP boundary.
pub fn normalize_wallet(s: &str) -> Option<String> {
    if !is_wallet_address(s) {
        return None;
    }
    Address::from_str(s).ok().map(|a| a.to_string())
}

/// Record metadata fields from the upload form, before pinning.
#[derive(Debug, Default)]
pub struct RecordForm {
    pub patient_address: String,
    pub name: String,
    pub acc_json: String,
    pub data_to_encrypt_hash: String,
}

pub fn validate_record(form: &RecordForm) -> Result<(), String> {
    if form.patient_address.trim().is_empty() {
        return Err("patient_address is required and cannot be empty".into());
    }
    if !is_wallet_address(&form.patient_address) {
        return Err("invalid Ethereum address format for patient_address".into());
    }
    if form.name.trim().is_empty() {
        return Err("name is required and cannot be empty".into());
    }
    if form.data_to_encrypt_hash.trim().is_empty() {
        return Err("data_to_encrypt_hash is required and cannot be empty".into());
    }
    if form.acc_json.trim().is_empty() {
        return Err("acc_json is required and cannot be empty".into());
    }
    Ok(())
}

/// Researcher profile creation payload.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ResearcherCreate {
    pub wallet_address: String,
    pub full_name: String,
    pub institution: String,
    #[serde(default)]
    pub department: Option<String>,
    pub professional_email: String,
    #[serde(default)]
    pub credentials_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

pub fn validate_researcher(researcher: &ResearcherCreate) -> Result<(), String> {
    if researcher.full_name.trim().is_empty() {
        return Err("full_name is required and cannot be empty".into());
    }
    if researcher.wallet_address.trim().is_empty() {
        return Err("wallet_address is required and cannot be empty".into());
    }
    if !is_wallet_address(&researcher.wallet_address) {
        return Err("invalid Ethereum address format for wallet_address".into());
    }
    if researcher.institution.trim().is_empty() {
        return Err("institution is required and cannot be empty".into());
    }
    if researcher.professional_email.trim().is_empty() {
        return Err("professional_email is required and cannot be empty".into());
    }
    Ok(())
}

/// Researcher profile update payload; the wallet comes from the path.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ResearcherUpdate {
    pub full_name: String,
    pub institution: String,
    #[serde(default)]
    pub department: Option<String>,
    pub professional_email: String,
    #[serde(default)]
    pub credentials_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

pub fn validate_researcher_update(update: &ResearcherUpdate) -> Result<(), String> {
    if update.full_name.trim().is_empty() {
        return Err("full_name is required and cannot be empty".into());
    }
    if update.institution.trim().is_empty() {
        return Err("institution is required and cannot be empty".into());
    }
    if update.professional_email.trim().is_empty() {
        return Err("professional_email is required and cannot be empty".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_address_format() {
        assert!(is_wallet_address(
            "0x2222222222222222222222222222222222222222"
        ));
        assert!(is_wallet_address(
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        ));
        assert!(!is_wallet_address("0x2222")); // too short
        assert!(!is_wallet_address(
            "2222222222222222222222222222222222222222aa"
        )); // no prefix
        assert!(!is_wallet_address(
            "0xzz22222222222222222222222222222222222222"
        )); // not hex
    }

    fn valid_form() -> RecordForm {
        RecordForm {
            patient_address: "0x1111111111111111111111111111111111111111".into(),
            name: "blood-panel".into(),
            acc_json: r#"[{"chain":"ethereum"}]"#.into(),
            data_to_encrypt_hash: "0xhash".into(),
        }
    }

    #[test]
    fn record_form_requires_all_fields() {
        assert!(validate_record(&valid_form()).is_ok());

        for mutate in [
            |f: &mut RecordForm| f.patient_address.clear(),
            |f: &mut RecordForm| f.name = "   ".into(),
            |f: &mut RecordForm| f.acc_json.clear(),
            |f: &mut RecordForm| f.data_to_encrypt_hash.clear(),
        ] {
            let mut form = valid_form();
            mutate(&mut form);
            assert!(validate_record(&form).is_err());
        }
    }

    #[test]
    fn researcher_requires_wallet_and_identity() {
        let ok = ResearcherCreate {
            wallet_address: "0x2222222222222222222222222222222222222222".into(),
            full_name: "Ada Lovelace".into(),
            institution: "AEI".into(),
            department: None,
            professional_email: "ada@aei.example".into(),
            credentials_url: None,
            bio: None,
        };
        assert!(validate_researcher(&ok).is_ok());

        let mut bad_wallet = ok.clone();
        bad_wallet.wallet_address = "0xnope".into();
        assert!(validate_researcher(&bad_wallet).is_err());

        let mut no_name = ok.clone();
        no_name.full_name = String::new();
        assert!(validate_researcher(&no_name).is_err());
    }

    #[test]
    fn wallet_normalization_is_case_insensitive() {
        let checksummed = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
        assert_eq!(
            normalize_wallet(&checksummed.to_lowercase()).as_deref(),
            Some(checksummed)
        );
        assert_eq!(normalize_wallet(checksummed).as_deref(), Some(checksummed));
        assert!(normalize_wallet("0xnope").is_none());
    }

    #[test]
    fn researcher_update_requires_identity_fields() {
        let ok = ResearcherUpdate {
            full_name: "Ada Lovelace".into(),
            institution: "AEI".into(),
            department: None,
            professional_email: "ada@aei.example".into(),
            credentials_url: None,
            bio: None,
        };
        assert!(validate_researcher_update(&ok).is_ok());

        let mut no_email = ok.clone();
        no_email.professional_email = "  ".into();
        assert!(validate_researcher_update(&no_email).is_err());

        let mut no_institution = ok;
        no_institution.institution = String::new();
        assert!(validate_researcher_update(&no_institution).is_err());
    }
}
