// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reads an MCAP recording back into [`super::RecordedMessage`]s, and
//! rehydrates the topic set and dynamic-types collection from its channels
//! and `dynamic_types` attachment.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::glue::DdsTopic;
use crate::types::DynamicTypesCollection;

use super::{RecordedMessage, ReplayError, ReplaySource};

pub struct McapReplaySource {
    mapped: Mmap,
    topics: HashMap<u16, DdsTopic>,
    dynamic_types: DynamicTypesCollection,
}

impl McapReplaySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let file = File::open(path)?;
        let mapped = unsafe { Mmap::map(&file)? };

        let summary = mcap::Summary::read(&mapped)
            .map_err(|e| ReplayError::Mcap(e.to_string()))?
            .ok_or_else(|| ReplayError::Inconsistency("recording has no summary section".into()))?;

        let mut topics = HashMap::new();
        for (id, channel) in &summary.channels {
            let type_name = channel
                .schema
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_else(|| "unknown".to_string());
            topics.insert(
                *id,
                DdsTopic { topic_name: channel.topic.clone(), type_name },
            );
        }

        let mut dynamic_types = DynamicTypesCollection::default();
        for attachment in mcap::read::AttachmentReader::new(&mapped)
            .map_err(|e| ReplayError::Mcap(e.to_string()))?
        {
            let attachment = attachment.map_err(|e| ReplayError::Mcap(e.to_string()))?;
            if attachment.name == "dynamic_types" {
                dynamic_types = crate::serializer::decode_collection(&attachment.data)
                    .map_err(|e| ReplayError::Inconsistency(e.to_string()))?;
            }
        }

        Ok(Self { mapped, topics, dynamic_types })
    }
}

impl ReplaySource for McapReplaySource {
    fn topics(&self) -> Vec<DdsTopic> {
        self.topics.values().cloned().collect()
    }

    fn dynamic_types(&self) -> DynamicTypesCollection {
        self.dynamic_types.clone()
    }

    fn messages(&mut self) -> Result<Vec<RecordedMessage>, ReplayError> {
        let mut out = Vec::new();
        let stream =
            mcap::MessageStream::new(&self.mapped).map_err(|e| ReplayError::Mcap(e.to_string()))?;

        for message in stream {
            let message = message.map_err(|e| ReplayError::Mcap(e.to_string()))?;
            let topic = self
                .topics
                .get(&message.channel.id)
                .cloned()
                .unwrap_or_else(|| DdsTopic {
                    topic_name: message.channel.topic.clone(),
                    type_name: "unknown".to_string(),
                });
            out.push(RecordedMessage {
                topic,
                log_time_ns: message.log_time,
                publish_time_ns: message.publish_time,
                payload: message.data.into_owned(),
            });
        }

        out.sort_by_key(|m| m.publish_time_ns);
        Ok(out)
    }
}
