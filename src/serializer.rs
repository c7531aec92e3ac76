// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Canonical encode/decode for the values that cross a sidecar boundary:
//! topic QoS, type identifiers/objects, and the dynamic-types collection.
//!
//! Round-trip exactness (encode then decode yields the original value) is a
//! tested invariant, not just a goal.

use base64::Engine;
use thiserror::Error;

use crate::types::{Durability, Ownership, Reliability, TopicQoS};

#[derive(Debug, Error)]
pub enum SerializerError {
    #[error("malformed QoS text: {0}")]
    InvalidQos(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes a [`TopicQoS`] to the stable string form stored in Channel
/// metadata.
pub fn encode_qos(qos: &TopicQoS) -> String {
    qos.encode()
}

/// Inverse of [`encode_qos`]. Tolerates the exact format `TopicQoS::encode`
/// produces; any other text is rejected rather than partially parsed.
pub fn decode_qos(text: &str) -> Result<TopicQoS, SerializerError> {
    let mut reliability = None;
    let mut durability = None;
    let mut ownership = None;
    let mut keyed = None;
    let mut partitions = Vec::new();
    let mut authoritative = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "reliability" => {
                reliability = Some(match value {
                    "best_effort" => Reliability::BestEffort,
                    "reliable" => Reliability::Reliable,
                    other => return Err(SerializerError::InvalidQos(format!("reliability: {other}"))),
                });
            }
            "durability" => {
                durability = Some(match value {
                    "volatile" => Durability::Volatile,
                    "transient_local" => Durability::TransientLocal,
                    "transient" => Durability::Transient,
                    "persistent" => Durability::Persistent,
                    other => return Err(SerializerError::InvalidQos(format!("durability: {other}"))),
                });
            }
            "ownership" => {
                ownership = Some(match value {
                    "shared" => Ownership::Shared,
                    "exclusive" => Ownership::Exclusive,
                    other => return Err(SerializerError::InvalidQos(format!("ownership: {other}"))),
                });
            }
            "keyed" => {
                keyed = Some(value.parse::<bool>().map_err(|_| {
                    SerializerError::InvalidQos(format!("keyed: {value}"))
                })?);
            }
            "partitions" => {
                let inner = value.trim_start_matches('[').trim_end_matches(']');
                partitions = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "authoritative" => {
                authoritative = Some(value.parse::<bool>().map_err(|_| {
                    SerializerError::InvalidQos(format!("authoritative: {value}"))
                })?);
            }
            _ => {}
        }
    }

    Ok(TopicQoS {
        reliability: reliability.ok_or_else(|| SerializerError::InvalidQos("missing reliability".into()))?,
        durability: durability.ok_or_else(|| SerializerError::InvalidQos("missing durability".into()))?,
        ownership: ownership.ok_or_else(|| SerializerError::InvalidQos("missing ownership".into()))?,
        keyed: keyed.ok_or_else(|| SerializerError::InvalidQos("missing keyed".into()))?,
        partitions,
        authoritative: authoritative.ok_or_else(|| SerializerError::InvalidQos("missing authoritative".into()))?,
    })
}

/// Wraps raw type-identifier/type-object bytes as the base64 text stored in
/// a [`crate::types::DynamicTypeEntry`].
pub fn encode_bytes(raw: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw)
}

pub fn decode_bytes(text: &str) -> Result<Vec<u8>, SerializerError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
}

use crate::types::DynamicTypesCollection;

/// Serializes the whole dynamic-types collection for the MCAP attachment /
/// SQL `Types` snapshot. JSON is used as the CDR stand-in so the sidecar is
/// self-contained without a wire-format dependency the core does not carry.
pub fn encode_collection(collection: &DynamicTypesCollection) -> Result<Vec<u8>, SerializerError> {
    Ok(serde_json::to_vec(collection)?)
}

pub fn decode_collection(bytes: &[u8]) -> Result<DynamicTypesCollection, SerializerError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DynamicTypeEntry;

    #[test]
    fn qos_round_trips() {
        let qos = TopicQoS {
            reliability: Reliability::Reliable,
            durability: Durability::TransientLocal,
            ownership: Ownership::Exclusive,
            keyed: true,
            partitions: vec!["a".to_string(), "b".to_string()],
            authoritative: true,
        };
        let text = encode_qos(&qos);
        let decoded = decode_qos(&text).unwrap();
        assert_eq!(qos, decoded);
    }

    /// `authoritative: false` must survive the round trip too, not just the
    /// `true` case (the decoder previously hard-coded `true`).
    #[test]
    fn qos_round_trips_non_authoritative() {
        let qos = TopicQoS { authoritative: false, ..TopicQoS::default() };
        let text = encode_qos(&qos);
        let decoded = decode_qos(&text).unwrap();
        assert_eq!(qos, decoded);
    }

    #[test]
    fn bytes_round_trip() {
        let raw = vec![0u8, 1, 2, 255, 254];
        let text = encode_bytes(&raw);
        assert_eq!(decode_bytes(&text).unwrap(), raw);
    }

    #[test]
    fn collection_round_trips_byte_for_byte() {
        let mut collection = DynamicTypesCollection::default();
        collection.insert(DynamicTypeEntry {
            type_name: "Hello".to_string(),
            type_information: encode_bytes(&[1, 2, 3]),
            type_object: encode_bytes(&[4, 5, 6]),
        });
        let bytes = encode_collection(&collection).unwrap();
        let decoded = decode_collection(&bytes).unwrap();
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.entries[0].type_name, "Hello");
    }
}
