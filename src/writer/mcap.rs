// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MCAP output writer.
//!
//! Writes, per file: a `version` metadata record, all known schemas, all
//! known channels, interleaved messages, and -- on close -- the
//! `dynamic_types` attachment and a `message_guid_map` metadata record.
//! Schema/channel records are kept in memory and re-emitted as the first
//! records of every new file so each file replays independently.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use crate::file_tracker::FileTracker;
use crate::size_tracker::{SizeTracker, SizedObject};
use crate::types::{Channel, DynamicTypesCollection, Message, Schema};

use super::{Writer, WriterError};

const VERSION_RELEASE: &str = env!("CARGO_PKG_VERSION");
const VERSION_COMMIT: &str = "unknown";

pub struct McapWriter {
    file_tracker: Arc<FileTracker>,
    space_available: u64,
    size_tracker: SizeTracker,
    inner: Option<mcap::Writer<'static, BufWriter<File>>>,
    schemas: Vec<Schema>,
    channels: Vec<Channel>,
    mcap_channel_ids: HashMap<u16, u16>,
    dynamic_types: DynamicTypesCollection,
    dynamic_types_reserved: u64,
    guid_counts: BTreeMap<String, u64>,
    enabled: bool,
}

impl McapWriter {
    pub fn new(file_tracker: Arc<FileTracker>, space_available: u64) -> Self {
        Self {
            file_tracker,
            space_available,
            size_tracker: SizeTracker::new(),
            inner: None,
            schemas: Vec::new(),
            channels: Vec::new(),
            mcap_channel_ids: HashMap::new(),
            dynamic_types: DynamicTypesCollection::default(),
            dynamic_types_reserved: 0,
            guid_counts: BTreeMap::new(),
            enabled: false,
        }
    }

    fn open_new_file(&mut self, min_size: u64) -> Result<(), WriterError> {
        let name = self.file_tracker.new_file(min_size)?;
        let tmp_name = self.file_tracker.current_filename();
        let _ = name;
        let file = File::create(&tmp_name)?;
        let mut writer = mcap::Writer::new(BufWriter::new(file))
            .map_err(|e| WriterError::Mcap(e.to_string()))?;

        self.write_version_metadata(&mut writer)?;
        self.mcap_channel_ids.clear();

        let schemas = self.schemas.clone();
        let channels = self.channels.clone();
        for channel in &channels {
            self.emit_channel(&mut writer, channel, &schemas)?;
        }

        self.size_tracker.init(self.space_available, min_size);
        self.inner = Some(writer);
        Ok(())
    }

    fn write_version_metadata(
        &self,
        writer: &mut mcap::Writer<'static, BufWriter<File>>,
    ) -> Result<(), WriterError> {
        let mut values = BTreeMap::new();
        values.insert("release".to_string(), VERSION_RELEASE.to_string());
        values.insert("commit".to_string(), VERSION_COMMIT.to_string());
        writer
            .write_metadata(&mcap::records::Metadata {
                name: "version".to_string(),
                metadata: values.into_iter().collect(),
            })
            .map_err(|e| WriterError::Mcap(e.to_string()))
    }

    fn emit_channel(
        &mut self,
        writer: &mut mcap::Writer<'static, BufWriter<File>>,
        channel: &Channel,
        schemas: &[Schema],
    ) -> Result<(), WriterError> {
        let schema = schemas.iter().find(|s| s.id == channel.schema_id);
        let mcap_schema = schema.map(|s| {
            Arc::new(mcap::Schema {
                name: s.name.clone(),
                encoding: s.encoding.as_str().to_string(),
                data: Cow::Owned(s.data.clone().into_bytes()),
            })
        });

        let mcap_channel = mcap::Channel {
            topic: channel.topic_name.clone(),
            schema: mcap_schema,
            message_encoding: channel.message_encoding.clone(),
            metadata: channel.metadata().into_iter().collect(),
        };

        let mcap_id = writer
            .add_channel(&mcap_channel)
            .map_err(|e| WriterError::Mcap(e.to_string()))?;
        self.mcap_channel_ids.insert(channel.id, mcap_id);
        Ok(())
    }

    fn close_current_file(&mut self) -> Result<(), WriterError> {
        if let Some(mut writer) = self.inner.take() {
            self.write_dynamic_types_attachment(&mut writer)?;
            self.write_guid_map_metadata(&mut writer)?;
            writer.finish().map_err(|e| WriterError::Mcap(e.to_string()))?;
            self.file_tracker.set_current_file_size(self.size_tracker.written_size());
            self.file_tracker.close_file()?;
        }
        Ok(())
    }

    fn write_dynamic_types_attachment(
        &self,
        writer: &mut mcap::Writer<'static, BufWriter<File>>,
    ) -> Result<(), WriterError> {
        let payload = crate::serializer::encode_collection(&self.dynamic_types)
            .map_err(|e| WriterError::Inconsistency(e.to_string()))?;
        writer
            .attach(&mcap::Attachment {
                log_time: 0,
                create_time: 0,
                name: "dynamic_types".to_string(),
                media_type: "application/json".to_string(),
                data: Cow::Owned(payload),
            })
            .map_err(|e| WriterError::Mcap(e.to_string()))
    }

    fn write_guid_map_metadata(
        &self,
        writer: &mut mcap::Writer<'static, BufWriter<File>>,
    ) -> Result<(), WriterError> {
        let values = self
            .guid_counts
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        writer
            .write_metadata(&mcap::records::Metadata {
                name: "message_guid_map".to_string(),
                metadata: values,
            })
            .map_err(|e| WriterError::Mcap(e.to_string()))
    }

}

impl Writer for McapWriter {
    fn enable(&mut self) -> Result<(), WriterError> {
        if self.enabled {
            return Ok(());
        }
        self.open_new_file(0)?;
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), WriterError> {
        if !self.enabled {
            return Ok(());
        }
        self.close_current_file()?;
        self.size_tracker.reset();
        self.enabled = false;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn write_schema(&mut self, schema: &Schema) -> Result<(), WriterError> {
        let encoded = SizeTracker::encoded_size(
            SizedObject::Schema,
            &[
                schema.name.len() as u64,
                schema.encoding.as_str().len() as u64,
                schema.data.len() as u64,
            ],
        );

        if let Err(e) = self.size_tracker.check_and_increase(SizedObject::Schema, encoded) {
            self.recover_from_full_file(e, encoded)?;
        }

        if let Some(existing) = self.schemas.iter_mut().find(|s| s.id == schema.id) {
            *existing = schema.clone();
        } else {
            self.schemas.push(schema.clone());
        }
        Ok(())
    }

    fn write_channel(&mut self, channel: &Channel) -> Result<(), WriterError> {
        let metadata_kv = SizeTracker::kv_size(&channel.metadata());
        let encoded = SizeTracker::encoded_size(
            SizedObject::Channel,
            &[
                channel.topic_name.len() as u64,
                channel.message_encoding.len() as u64,
                metadata_kv,
            ],
        );

        if let Err(e) = self.size_tracker.check_and_increase(SizedObject::Channel, encoded) {
            self.recover_from_full_file(e, encoded)?;
        }

        if let Some(existing) = self.channels.iter_mut().find(|c| c.id == channel.id) {
            *existing = channel.clone();
        } else {
            self.channels.push(channel.clone());
        }

        let schemas = self.schemas.clone();
        let writer = self.inner.as_mut().ok_or(WriterError::DiskFull)?;
        let channel = channel.clone();
        let mcap_id = {
            let schema = schemas.iter().find(|s| s.id == channel.schema_id);
            let mcap_schema = schema.map(|s| {
                Arc::new(mcap::Schema {
                    name: s.name.clone(),
                    encoding: s.encoding.as_str().to_string(),
                    data: Cow::Owned(s.data.clone().into_bytes()),
                })
            });
            let mcap_channel = mcap::Channel {
                topic: channel.topic_name.clone(),
                schema: mcap_schema,
                message_encoding: channel.message_encoding.clone(),
                metadata: channel.metadata().into_iter().collect(),
            };
            writer
                .add_channel(&mcap_channel)
                .map_err(|e| WriterError::Mcap(e.to_string()))?
        };
        self.mcap_channel_ids.insert(channel.id, mcap_id);

        self.size_tracker.mark_written(encoded);
        Ok(())
    }

    fn write_message(&mut self, message: &Message) -> Result<(), WriterError> {
        let payload_len = message.data_size();
        let encoded = SizeTracker::encoded_size(SizedObject::Message, &[payload_len]);

        if let Err(e) = self.size_tracker.check_and_increase(SizedObject::Message, encoded) {
            self.recover_from_full_file(e, encoded)?;
        }

        let mcap_channel_id = *self
            .mcap_channel_ids
            .get(&message.channel_id)
            .ok_or_else(|| WriterError::Inconsistency("write_message before write_channel".into()))?;

        let writer = self.inner.as_mut().ok_or(WriterError::DiskFull)?;
        writer
            .write_to_known_channel(
                &mcap::records::MessageHeader {
                    channel_id: mcap_channel_id,
                    sequence: message.sequence as u32,
                    log_time: message.log_time_ns,
                    publish_time: message.publish_time_ns,
                },
                &message.payload,
            )
            .map_err(|e| WriterError::Mcap(e.to_string()))?;

        self.size_tracker.mark_written(encoded);
        *self
            .guid_counts
            .entry(hex_guid(&message.source_guid))
            .or_insert(0) += 1;
        Ok(())
    }

    fn update_dynamic_types(&mut self, collection: &DynamicTypesCollection) -> Result<(), WriterError> {
        let payload = crate::serializer::encode_collection(collection)
            .map_err(|e| WriterError::Inconsistency(e.to_string()))?;
        let new_size = SizeTracker::encoded_size(SizedObject::Attachment, &[payload.len() as u64]);

        if let Err(e) = self
            .size_tracker
            .replace_reservation(self.dynamic_types_reserved, new_size)
        {
            self.recover_from_full_file(e, new_size)?;
        }

        self.dynamic_types_reserved = new_size;
        self.dynamic_types = collection.clone();
        Ok(())
    }
}

impl McapWriter {
    fn recover_from_full_file(
        &mut self,
        cause: crate::size_tracker::SizeTrackerError,
        required: u64,
    ) -> Result<(), WriterError> {
        use crate::size_tracker::SizeTrackerError;
        match cause {
            SizeTrackerError::FullFile { required } => {
                let min_size = self.size_tracker.min_size() + required;
                self.close_current_file()?;
                match self.open_new_file(min_size) {
                    Ok(()) => Ok(()),
                    Err(_) => {
                        self.enabled = false;
                        Err(WriterError::DiskFull)
                    }
                }
            }
            SizeTrackerError::FullDisk => {
                let _ = required;
                self.enabled = false;
                Err(WriterError::DiskFull)
            }
        }
    }
}

fn hex_guid(guid: &[u8; 16]) -> String {
    guid.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reliability, Durability, Ownership, TopicQoS, SchemaEncoding};
    use std::sync::Arc as StdArc;
    use tempfile::tempdir;

    fn make_tracker(dir: &std::path::Path) -> Arc<FileTracker> {
        Arc::new(FileTracker::new(crate::file_tracker::FileTrackerConfig {
            directory: dir.to_path_buf(),
            filename_stem: "rec".to_string(),
            extension: ".mcap".to_string(),
            max_file_size: 1_000_000,
            max_total_size: 10_000_000,
            prepend_timestamp: false,
            rotation_enabled: false,
        }))
    }

    #[test]
    fn write_schema_channel_message_round_trip() {
        let dir = tempdir().unwrap();
        let tracker = make_tracker(dir.path());
        let mut w = McapWriter::new(tracker, 1_000_000);
        w.enable().unwrap();

        w.write_schema(&Schema {
            id: 1,
            name: "Hello".to_string(),
            encoding: SchemaEncoding::Ros2Msg,
            data: "string data".to_string(),
        })
        .unwrap();

        w.write_channel(&Channel {
            id: 1,
            topic_name: "/chatter".to_string(),
            message_encoding: "cdr".to_string(),
            schema_id: 1,
            qos: TopicQoS {
                reliability: Reliability::Reliable,
                durability: Durability::Volatile,
                ownership: Ownership::Shared,
                keyed: false,
                partitions: vec![],
                authoritative: true,
            },
            ros2_types: true,
        })
        .unwrap();

        w.write_message(&Message {
            sequence: 0,
            channel_id: 1,
            log_time_ns: 1_000,
            publish_time_ns: 1_000,
            source_guid: [1; 16],
            payload: StdArc::from(vec![0x01].into_boxed_slice()),
        })
        .unwrap();

        w.disable().unwrap();
    }

    #[test]
    fn exhausted_budget_with_rotation_disabled_reports_disk_full() {
        let dir = tempdir().unwrap();
        // max_total_size == max_file_size and rotation disabled: once the
        // first file is full there is nowhere left to rotate to.
        let tracker = Arc::new(FileTracker::new(crate::file_tracker::FileTrackerConfig {
            directory: dir.path().to_path_buf(),
            filename_stem: "rec".to_string(),
            extension: ".mcap".to_string(),
            max_file_size: 200,
            max_total_size: 200,
            prepend_timestamp: false,
            rotation_enabled: false,
        }));
        let mut w = McapWriter::new(tracker, 200);
        w.enable().unwrap();

        w.write_schema(&Schema {
            id: 1,
            name: "Hello".to_string(),
            encoding: SchemaEncoding::Ros2Msg,
            data: "string data".to_string(),
        })
        .unwrap();
        w.write_channel(&Channel {
            id: 1,
            topic_name: "/chatter".to_string(),
            message_encoding: "cdr".to_string(),
            schema_id: 1,
            qos: TopicQoS::default(),
            ros2_types: true,
        })
        .unwrap();

        let big_payload = vec![0u8; 4096];
        let err = w
            .write_message(&Message {
                sequence: 0,
                channel_id: 1,
                log_time_ns: 1_000,
                publish_time_ns: 1_000,
                source_guid: [1; 16],
                payload: StdArc::from(big_payload.into_boxed_slice()),
            })
            .unwrap_err();

        assert!(matches!(err, WriterError::DiskFull));
        assert!(!w.is_enabled());
    }
}
