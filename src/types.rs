// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core data model: topics, QoS, schemas, channels and messages.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reliability {
    BestEffort,
    Reliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Durability {
    Volatile,
    TransientLocal,
    Transient,
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ownership {
    Shared,
    Exclusive,
}

/// Quality-of-service carried alongside a topic. Equality of topic identity
/// ignores QoS; QoS is stored as metadata, not identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicQoS {
    pub reliability: Reliability,
    pub durability: Durability,
    pub ownership: Ownership,
    pub keyed: bool,
    pub partitions: Vec<String>,
    /// True when this QoS was actually discovered from a live writer; false
    /// when it is a best-effort default filled in before discovery.
    pub authoritative: bool,
}

impl Default for TopicQoS {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            ownership: Ownership::Shared,
            keyed: false,
            partitions: Vec::new(),
            authoritative: false,
        }
    }
}

impl TopicQoS {
    /// Stable, human-readable encoding used for sidecar storage.
    pub fn encode(&self) -> String {
        format!(
            "reliability: {}\ndurability: {}\nownership: {}\nkeyed: {}\npartitions: [{}]\nauthoritative: {}\n",
            match self.reliability {
                Reliability::BestEffort => "best_effort",
                Reliability::Reliable => "reliable",
            },
            match self.durability {
                Durability::Volatile => "volatile",
                Durability::TransientLocal => "transient_local",
                Durability::Transient => "transient",
                Durability::Persistent => "persistent",
            },
            match self.ownership {
                Ownership::Shared => "shared",
                Ownership::Exclusive => "exclusive",
            },
            self.keyed,
            self.partitions.join(", "),
            self.authoritative,
        )
    }

    pub fn partitions_string(&self) -> String {
        self.partitions.join(";")
    }
}

/// Identifies a topic independently of QoS.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicKey {
    pub topic_name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaEncoding {
    Ros2Msg,
    OmgIdl,
}

impl SchemaEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaEncoding::Ros2Msg => "ros2msg",
            SchemaEncoding::OmgIdl => "omgidl",
        }
    }
}

/// Text description of a type. Created "blank" (empty `data`) when a sample
/// for an unknown type must be accepted before discovery arrives.
#[derive(Debug, Clone)]
pub struct Schema {
    pub id: u16,
    pub name: String,
    pub encoding: SchemaEncoding,
    pub data: String,
}

impl Schema {
    pub fn blank(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            encoding: SchemaEncoding::Ros2Msg,
            data: String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.data.is_empty()
    }
}

/// Binds a topic to a schema within one output file.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: u16,
    pub topic_name: String,
    pub message_encoding: String,
    pub schema_id: u16,
    pub qos: TopicQoS,
    pub ros2_types: bool,
}

impl Channel {
    pub fn metadata(&self) -> std::collections::HashMap<String, String> {
        let mut m = std::collections::HashMap::new();
        m.insert("qos".to_string(), self.qos.encode());
        m.insert("ros2_types".to_string(), self.ros2_types.to_string());
        m.insert("partitions".to_string(), self.qos.partitions_string());
        m
    }
}

/// A single recorded sample, keyed to the channel it was captured on.
#[derive(Debug, Clone)]
pub struct Message {
    pub sequence: u64,
    pub channel_id: u16,
    pub log_time_ns: u64,
    pub publish_time_ns: u64,
    pub source_guid: [u8; 16],
    pub payload: Arc<[u8]>,
}

impl Message {
    pub fn data_size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// One entry of the dynamic-types collection: a type's serialized
/// identifier and object, persisted so files remain self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicTypeEntry {
    pub type_name: String,
    /// base64 CDR of the TypeInformation.
    pub type_information: String,
    /// base64 CDR of the TypeObject.
    pub type_object: String,
}

/// At most one entry per `type_name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicTypesCollection {
    pub entries: Vec<DynamicTypeEntry>,
}

impl DynamicTypesCollection {
    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.iter().any(|e| e.type_name == type_name)
    }

    /// Inserts or replaces the entry for `type_name`. Returns `true` if the
    /// collection grew (a new entry, not a replace).
    pub fn insert(&mut self, entry: DynamicTypeEntry) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.type_name == entry.type_name) {
            *existing = entry;
            false
        } else {
            self.entries.push(entry);
            true
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Mcap,
    Sql,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Mcap => "mcap",
            HandlerKind::Sql => "sql",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_encode_is_stable_and_deterministic() {
        let q = TopicQoS::default();
        assert_eq!(q.encode(), q.encode());
        assert!(q.encode().contains("best_effort"));
    }

    #[test]
    fn dynamic_types_collection_dedupes_by_name() {
        let mut c = DynamicTypesCollection::default();
        let grew = c.insert(DynamicTypeEntry {
            type_name: "Hello".to_string(),
            type_information: "aa".to_string(),
            type_object: "bb".to_string(),
        });
        assert!(grew);
        let grew_again = c.insert(DynamicTypeEntry {
            type_name: "Hello".to_string(),
            type_information: "cc".to_string(),
            type_object: "dd".to_string(),
        });
        assert!(!grew_again);
        assert_eq!(c.len(), 1);
        assert_eq!(c.entries[0].type_information, "cc");
    }

    #[test]
    fn blank_schema_has_empty_data() {
        let s = Schema::blank(0, "Unknown");
        assert!(s.is_blank());
    }
}
