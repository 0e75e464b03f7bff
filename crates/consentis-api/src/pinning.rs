//! IPFS pinning client (Pinata-compatible API).
//!
//! Uploads go to `{base_url}/pinning/pinFileToIPFS` as multipart forms.
//! Server-side errors (5xx) and transport failures are retried with
//! exponential backoff; client errors are not.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use consentis_core::config::PinningConfig;

/// Upload size cap, enforced before any bytes leave the process.
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum PinningError {
    #[error("file of {size} bytes exceeds the {MAX_FILE_SIZE}-byte limit")]
    FileTooLarge { size: usize },

    #[error("pinning request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("pinning service returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Client for a Pinata-style pinning service.
pub struct PinningClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl PinningClient {
    pub fn new(config: &PinningConfig) -> Result<Self, PinningError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Pin `bytes` under `filename` and return the content id.
    ///
    /// `name` and `patient` become pin metadata so uploads can be traced
    /// back from the pinning dashboard.
    pub async fn pin_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        name: &str,
        patient: &str,
    ) -> Result<String, PinningError> {
        if bytes.len() > MAX_FILE_SIZE {
            return Err(PinningError::FileTooLarge { size: bytes.len() });
        }

        let url = format!("{}/pinning/pinFileToIPFS", self.base_url);
        let metadata = serde_json::json!({
            "name": name,
            "keyvalues": { "patient": patient },
        });

        let mut attempt = 0;
        loop {
            // Multipart forms are single-use; rebuild per attempt.
            let form = reqwest::multipart::Form::new()
                .part(
                    "file",
                    reqwest::multipart::Part::bytes(bytes.clone())
                        .file_name(filename.to_string()),
                )
                .text("pinataMetadata", metadata.to_string())
                .text("pinataOptions", r#"{"cidVersion":1}"#);

            let result = self
                .http
                .post(&url)
                .header("pinata_api_key", &self.api_key)
                .header("pinata_secret_api_key", &self.api_secret)
                .multipart(form)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let pin: PinResponse = resp.json().await?;
                    debug!(cid = %pin.ipfs_hash, filename, "file pinned");
                    return Ok(pin.ipfs_hash);
                }
                Ok(resp) if resp.status().is_server_error() && attempt < MAX_RETRIES => {
                    warn!(status = %resp.status(), attempt, "pinning service error, retrying");
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(PinningError::Upstream { status, body });
                }
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(error = %e, attempt, "pinning request failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            attempt += 1;
        }
    }
}
