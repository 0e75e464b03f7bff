//! Raw log → typed event decoding.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_json_abi::Event;
use alloy_primitives::{Address, B256};
use std::str::FromStr;

use consentis_core::error::DecodeError;
use consentis_core::event::{ConsentEvent, EventKind, RawLog};

use crate::registry::ConsentRegistryAbi;

impl ConsentRegistryAbi {
    /// Decode one raw log into a typed consent event.
    ///
    /// topics[1] is the patient, topics[2] the researcher (32-byte words
    /// reinterpreted as addresses); the data payload carries the record id
    /// per the event's field schema. No side effects, deterministic.
    pub fn decode_log(&self, log: &RawLog, kind: EventKind) -> Result<ConsentEvent, DecodeError> {
        if log.topics.len() < 3 {
            return Err(DecodeError::MissingTopics {
                got: log.topics.len(),
            });
        }

        let patient = topic_address(&log.topics[1])?;
        let researcher = topic_address(&log.topics[2])?;

        let record_id = decode_record_id(self.event(kind), &log.data).map_err(|reason| {
            DecodeError::AbiDecodeFailed {
                reason,
                data_hex: log.data_hex(),
            }
        })?;

        Ok(ConsentEvent {
            kind,
            patient,
            researcher,
            record_id,
            tx_hash: log.tx_hash.clone(),
            block_number: log.block_number,
        })
    }
}

/// Reinterpret a 32-byte indexed topic as an address (last 20 bytes).
fn topic_address(topic: &str) -> Result<Address, DecodeError> {
    let word = B256::from_str(topic).map_err(|e| DecodeError::InvalidTopic {
        reason: format!("{topic}: {e}"),
    })?;
    Ok(Address::from_word(word))
}

/// ABI-decode the non-indexed payload and pull out the `recordId` string.
fn decode_record_id(event: &Event, data: &[u8]) -> Result<String, String> {
    let data_params: Vec<_> = event.inputs.iter().filter(|p| !p.indexed).collect();

    let tuple_types = data_params
        .iter()
        .map(|p| DynSolType::parse(&p.ty).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    let decoded = DynSolType::Tuple(tuple_types)
        .abi_decode(data)
        .map_err(|e| e.to_string())?;

    let values = match decoded {
        DynSolValue::Tuple(vals) => vals,
        other => vec![other],
    };

    for (param, value) in data_params.iter().zip(values) {
        if param.name == "recordId" {
            return match value {
                DynSolValue::String(s) => Ok(s),
                other => Err(format!(
                    "recordId has unexpected type {:?}",
                    other.as_type()
                )),
            };
        }
    }

    Err("recordId field missing from event schema".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATIENT: &str = "0x1111111111111111111111111111111111111111";
    const RESEARCHER: &str = "0x2222222222222222222222222222222222222222";

    /// Standard ABI encoding of `(string recordId)`: offset word, length
    /// word, then the bytes padded to a 32-byte boundary.
    fn encode_record_id(s: &str) -> Vec<u8> {
        let mut out = vec![0u8; 32];
        out[31] = 0x20;

        let mut len = vec![0u8; 32];
        len[24..].copy_from_slice(&(s.len() as u64).to_be_bytes());
        out.extend(len);

        let mut bytes = s.as_bytes().to_vec();
        bytes.resize(s.len().div_ceil(32) * 32, 0);
        out.extend(bytes);
        out
    }

    fn address_topic(addr: &str) -> String {
        let addr = Address::from_str(addr).unwrap();
        format!("0x{}", hex::encode(addr.into_word()))
    }

    fn sample_log(abi: &ConsentRegistryAbi, kind: EventKind, record_id: &str) -> RawLog {
        RawLog {
            address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
            topics: vec![
                format!("0x{}", hex::encode(abi.topic0(kind))),
                address_topic(PATIENT),
                address_topic(RESEARCHER),
            ],
            data: encode_record_id(record_id),
            tx_hash: "0xfeed".into(),
            block_number: 42,
            removed: false,
        }
    }

    #[test]
    fn decodes_granted_event() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let log = sample_log(&abi, EventKind::Granted, "rec-1");

        let event = abi.decode_log(&log, EventKind::Granted).unwrap();
        assert_eq!(event.kind, EventKind::Granted);
        assert_eq!(event.patient, Address::from_str(PATIENT).unwrap());
        assert_eq!(event.researcher, Address::from_str(RESEARCHER).unwrap());
        assert_eq!(event.record_id, "rec-1");
        assert_eq!(event.tx_hash, "0xfeed");
        assert_eq!(event.block_number, 42);
    }

    #[test]
    fn decodes_record_id_longer_than_one_word() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let id = "record-with-a-name-well-past-thirty-two-bytes";
        let log = sample_log(&abi, EventKind::Revoked, id);

        let event = abi.decode_log(&log, EventKind::Revoked).unwrap();
        assert_eq!(event.record_id, id);
        assert_eq!(event.kind, EventKind::Revoked);
    }

    #[test]
    fn rejects_log_with_too_few_topics() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let mut log = sample_log(&abi, EventKind::Granted, "rec-1");
        log.topics.truncate(2);

        let err = abi.decode_log(&log, EventKind::Granted).unwrap_err();
        assert!(matches!(err, DecodeError::MissingTopics { got: 2 }));
    }

    #[test]
    fn malformed_payload_carries_raw_hex() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let mut log = sample_log(&abi, EventKind::Granted, "rec-1");
        log.data = vec![0xde, 0xad, 0xbe, 0xef];

        let err = abi.decode_log(&log, EventKind::Granted).unwrap_err();
        match err {
            DecodeError::AbiDecodeFailed { data_hex, .. } => {
                assert_eq!(data_hex, "0xdeadbeef");
            }
            other => panic!("expected AbiDecodeFailed, got {other:?}"),
        }
    }

    #[test]
    fn invalid_topic_hex_is_rejected() {
        let abi = ConsentRegistryAbi::bundled().unwrap();
        let mut log = sample_log(&abi, EventKind::Granted, "rec-1");
        log.topics[1] = "0xzz".into();

        let err = abi.decode_log(&log, EventKind::Granted).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTopic { .. }));
    }
}
