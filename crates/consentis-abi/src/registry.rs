//! Parsed contract interface with per-event selectors.

use alloy_json_abi::{Event, JsonAbi};
use alloy_primitives::B256;

use consentis_core::error::AbiError;
use consentis_core::event::EventKind;

/// The parsed ConsentRegistry interface.
///
/// Read-only after construction; safe to share across subscription channels
/// behind an `Arc`.
#[derive(Debug)]
pub struct ConsentRegistryAbi {
    granted: Event,
    revoked: Event,
    granted_topic: B256,
    revoked_topic: B256,
}

impl ConsentRegistryAbi {
    /// Parse an interface definition from its JSON text.
    ///
    /// Both consent events must be present; anything else is a fatal
    /// startup error.
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        let abi: JsonAbi =
            serde_json::from_str(json).map_err(|e| AbiError::Parse(e.to_string()))?;

        let granted = resolve_event(&abi, EventKind::Granted)?;
        let revoked = resolve_event(&abi, EventKind::Revoked)?;
        let granted_topic = granted.selector();
        let revoked_topic = revoked.selector();

        Ok(Self {
            granted,
            revoked,
            granted_topic,
            revoked_topic,
        })
    }

    /// Load the interface definition from a file on disk.
    pub fn from_file(path: &std::path::Path) -> Result<Self, AbiError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse the interface bundled with the crate.
    pub fn bundled() -> Result<Self, AbiError> {
        Self::from_json(crate::BUNDLED_ABI)
    }

    /// The topic0 signature hash used to filter the subscription for `kind`.
    pub fn topic0(&self, kind: EventKind) -> B256 {
        match kind {
            EventKind::Granted => self.granted_topic,
            EventKind::Revoked => self.revoked_topic,
        }
    }

    pub(crate) fn event(&self, kind: EventKind) -> &Event {
        match kind {
            EventKind::Granted => &self.granted,
            EventKind::Revoked => &self.revoked,
        }
    }
}

fn resolve_event(abi: &JsonAbi, kind: EventKind) -> Result<Event, AbiError> {
    abi.events
        .get(kind.event_name())
        .and_then(|overloads| overloads.first())
        .cloned()
        .ok_or_else(|| AbiError::EventMissing {
            name: kind.event_name().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_interface_parses() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        // The two events have identical parameter lists, so only the name
        // differs — the selectors must still be distinct.
        assert_ne!(
            abi.topic0(EventKind::Granted),
            abi.topic0(EventKind::Revoked)
        );
    }

    #[test]
    fn missing_event_is_fatal() {
        let err = ConsentRegistryAbi::from_json("[]").unwrap_err();
        assert!(matches!(err, AbiError::EventMissing { .. }));
    }

    #[test]
    fn garbage_json_is_fatal() {
        let err = ConsentRegistryAbi::from_json("not json").unwrap_err();
        assert!(matches!(err, AbiError::Parse(_)));
    }
}
