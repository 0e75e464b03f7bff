//! consentis-abi — ConsentRegistry contract interface and event decoder.
//!
//! Parses the registry's JSON interface once at startup, resolves the two
//! consent events to their topic0 selectors, and decodes raw logs into typed
//! [`ConsentEvent`](consentis_core::ConsentEvent) values. Decoding is pure
//! and stateless; transport and persistence live elsewhere.

mod decoder;
mod registry;

pub use registry::ConsentRegistryAbi;

/// The contract interface shipped with the binary, matching the deployed
/// ConsentRegistry.
pub const BUNDLED_ABI: &str = include_str!("../abi/ConsentRegistry.json");
