//! HTTP request handlers.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info};

use consentis_core::error::StorageError;
use consentis_core::model::{HealthRecord, ResearcherProfile};

use crate::pinning::PinningError;
use crate::validate::{self, RecordForm, ResearcherCreate, ResearcherUpdate};
use crate::AppState;

/// Handler-level failures mapped onto HTTP statuses.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(&'static str),
    Conflict(&'static str),
    Unavailable(&'static str),
    Upload(PinningError),
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what.to_string()),
            ApiError::Conflict(what) => (StatusCode::CONFLICT, what.to_string()),
            ApiError::Unavailable(what) => (StatusCode::SERVICE_UNAVAILABLE, what.to_string()),
            ApiError::Upload(PinningError::FileTooLarge { size }) => (
                StatusCode::BAD_REQUEST,
                format!("uploaded file of {size} bytes is too large"),
            ),
            ApiError::Upload(e) => {
                error!(error = %e, "upload to pinning service failed");
                (StatusCode::BAD_GATEWAY, "IPFS upload failed".to_string())
            }
            ApiError::Storage(e) => {
                error!(error = %e, "storage error while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Validate a wallet and return it in the checksummed form the store keys
/// rows by, so lookups succeed whatever case the caller used.
fn checked_wallet(wallet: &str) -> Result<String, ApiError> {
    validate::normalize_wallet(wallet).ok_or_else(|| {
        ApiError::BadRequest("invalid Ethereum address format".into())
    })
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Consent status for one (record, researcher) pair.
pub async fn get_consent(
    State(state): State<AppState>,
    Path((record_id, researcher)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let researcher = checked_wallet(&researcher)?;

    match state.store.get_consent(&record_id, &researcher).await? {
        Some(row) => Ok(Json(row).into_response()),
        None => Err(ApiError::NotFound("consent not found")),
    }
}

/// All consent rows naming this researcher, granted or revoked.
pub async fn researcher_consents(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Response, ApiError> {
    let wallet = checked_wallet(&wallet)?;

    let rows = state.store.consents_for_researcher(&wallet).await?;
    Ok(Json(rows).into_response())
}

/// Record metadata upload: multipart form with the metadata fields and the
/// encrypted payload as `file`. The payload is pinned to IPFS first; the
/// returned CID is persisted with the metadata.
pub async fn create_record(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = RecordForm::default();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart form: {e}")))?
    {
        let text_err = |e| ApiError::BadRequest(format!("unreadable form field: {e}"));
        match field.name().unwrap_or_default() {
            "patient_address" => form.patient_address = field.text().await.map_err(text_err)?,
            "name" => form.name = field.text().await.map_err(text_err)?,
            "acc_json" => form.acc_json = field.text().await.map_err(text_err)?,
            "data_to_encrypt_hash" => {
                form.data_to_encrypt_hash = field.text().await.map_err(text_err)?
            }
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(text_err)?;
                file = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    validate::validate_record(&form).map_err(ApiError::BadRequest)?;
    form.patient_address = checked_wallet(&form.patient_address)?;
    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("file is required".into()))?;
    let access_conditions: serde_json::Value = serde_json::from_str(&form.acc_json)
        .map_err(|e| ApiError::BadRequest(format!("acc_json is not valid JSON: {e}")))?;

    let pinning = state
        .pinning
        .as_ref()
        .ok_or(ApiError::Unavailable("pinning service is not configured"))?;
    let cid = pinning
        .pin_file(&filename, bytes, &form.name, &form.patient_address)
        .await
        .map_err(ApiError::Upload)?;
    info!(%cid, patient = %form.patient_address, "record payload pinned");

    let record = HealthRecord {
        patient_address: form.patient_address,
        name: form.name,
        ipfs_cid: cid.clone(),
        data_to_encrypt_hash: form.data_to_encrypt_hash,
        access_conditions,
        created_at: Utc::now(),
    };
    state.store.insert_record(&record).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "record added successfully", "cid": cid })),
    )
        .into_response())
}

pub async fn patient_records(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Response, ApiError> {
    let wallet = checked_wallet(&wallet)?;

    let records = state.store.records_for_patient(&wallet).await?;
    Ok(Json(records).into_response())
}

/// Every persisted record, for the researcher-facing catalogue view.
pub async fn list_records(State(state): State<AppState>) -> Result<Response, ApiError> {
    let records = state.store.list_records().await?;
    Ok(Json(records).into_response())
}

pub async fn create_researcher(
    State(state): State<AppState>,
    Json(payload): Json<ResearcherCreate>,
) -> Result<Response, ApiError> {
    validate::validate_researcher(&payload).map_err(ApiError::BadRequest)?;

    let profile = ResearcherProfile {
        wallet_address: checked_wallet(&payload.wallet_address)?,
        full_name: payload.full_name,
        institution: payload.institution,
        department: payload.department,
        professional_email: payload.professional_email,
        credentials_url: payload.credentials_url,
        bio: payload.bio,
    };
    state.store.upsert_researcher_profile(&profile).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "researcher profile saved" })),
    )
        .into_response())
}

pub async fn get_researcher(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Response, ApiError> {
    let wallet = checked_wallet(&wallet)?;

    match state.store.get_researcher_profile(&wallet).await? {
        Some(profile) => Ok(Json(profile).into_response()),
        None => Err(ApiError::NotFound("researcher not found")),
    }
}

/// Overwrite an existing researcher profile. The professional email must
/// not already belong to another researcher.
pub async fn update_researcher(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Json(payload): Json<ResearcherUpdate>,
) -> Result<Response, ApiError> {
    let wallet = checked_wallet(&wallet)?;
    validate::validate_researcher_update(&payload).map_err(ApiError::BadRequest)?;

    if state
        .store
        .is_email_taken_by_other(&payload.professional_email, &wallet)
        .await?
    {
        return Err(ApiError::Conflict(
            "email is already in use by another researcher",
        ));
    }

    let profile = ResearcherProfile {
        wallet_address: wallet,
        full_name: payload.full_name,
        institution: payload.institution,
        department: payload.department,
        professional_email: payload.professional_email,
        credentials_url: payload.credentials_url,
        bio: payload.bio,
    };
    if !state.store.update_researcher_profile(&profile).await? {
        return Err(ApiError::NotFound("researcher not found"));
    }

    Ok(Json(json!({ "message": "researcher profile updated" })).into_response())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
