//! Startup configuration.
//!
//! The process environment is read exactly once, here, into an explicit
//! struct that is passed by reference into the listener and the API server.
//! Indexer logic never performs ambient environment lookups.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Credentials for the IPFS pinning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinningConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Everything the process needs to run, resolved at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// WebSocket RPC endpoint of the upstream node (`ws://` or `wss://`).
    pub rpc_ws_url: String,
    /// Address of the deployed ConsentRegistry contract.
    pub contract_address: Address,
    /// Database connection string (`sqlite:` or `postgresql:` URL).
    pub database_url: String,
    /// Bind address for the HTTP API.
    pub http_addr: String,
    /// How long shutdown may take before the process gives up waiting.
    pub shutdown_grace_secs: u64,
    /// Pinning service credentials; uploads are disabled when absent.
    pub pinning: Option<PinningConfig>,
}

impl AppConfig {
    /// Build the configuration from the process environment.
    ///
    /// Missing node endpoint, contract address, or database URL is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_ws_url = required("ETH_CLIENT_ADDRESS")?;
        let contract_address = required("CONTRACT_ADDRESS")?
            .parse::<Address>()
            .map_err(|e| ConfigError::InvalidValue {
                name: "CONTRACT_ADDRESS",
                reason: e.to_string(),
            })?;
        let database_url = required("DATABASE_URL")?;

        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let shutdown_grace_secs = match std::env::var("SHUTDOWN_GRACE_SECS") {
            Ok(v) => v.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                name: "SHUTDOWN_GRACE_SECS",
                reason: e.to_string(),
            })?,
            Err(_) => 10,
        };

        // Both pinning credentials must be present, or uploads stay disabled.
        let pinning = match (
            std::env::var("PINATA_API_KEY"),
            std::env::var("PINATA_API_SECRET"),
        ) {
            (Ok(api_key), Ok(api_secret)) => Some(PinningConfig {
                base_url: std::env::var("PINATA_BASE_URL")
                    .unwrap_or_else(|_| "https://api.pinata.cloud".to_string()),
                api_key,
                api_secret,
            }),
            _ => None,
        };

        Ok(Self {
            rpc_ws_url,
            contract_address,
            database_url,
            http_addr,
            shutdown_grace_secs,
            pinning,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar { name }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test to avoid
    // interleaving with parallel test threads.
    #[test]
    fn from_env_requires_core_vars() {
        std::env::remove_var("ETH_CLIENT_ADDRESS");
        std::env::remove_var("CONTRACT_ADDRESS");
        std::env::remove_var("DATABASE_URL");

        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingVar { name: "ETH_CLIENT_ADDRESS" }
        ));

        std::env::set_var("ETH_CLIENT_ADDRESS", "ws://localhost:8545");
        std::env::set_var("CONTRACT_ADDRESS", "not-an-address");
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
        assert!(matches!(
            AppConfig::from_env().unwrap_err(),
            ConfigError::InvalidValue { name: "CONTRACT_ADDRESS", .. }
        ));

        std::env::set_var(
            "CONTRACT_ADDRESS",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        );
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.rpc_ws_url, "ws://localhost:8545");
        assert_eq!(cfg.http_addr, "0.0.0.0:8080");
        assert_eq!(cfg.shutdown_grace_secs, 10);
        assert!(cfg.pinning.is_none());
    }
}
