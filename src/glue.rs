// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The DDS transport boundary. The core never depends on a real DDS
//! participant; it consumes `(topic, qos, payload, guid, timestamp)` tuples
//! through [`DdsSource`] and re-publishes through [`DdsSink`]. The only
//! implementation shipped here is an in-memory, channel-backed pair used by
//! tests and the binaries' loopback mode.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SendError, Sender};
use std::time::Duration;

use thiserror::Error;

use crate::types::{SchemaEncoding, TopicQoS};

#[derive(Debug, Error)]
pub enum GlueError {
    #[error("channel disconnected")]
    Disconnected,

    #[error("writer for topic {0} could not be created")]
    WriterCreationFailed(String),
}

/// A DDS topic, named independently of any particular sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DdsTopic {
    pub topic_name: String,
    pub type_name: String,
}

/// Raw bytes plus the envelope metadata the recorder needs, exactly as they
/// would arrive from an RTPS reader callback.
#[derive(Debug, Clone)]
pub struct RtpsPayloadData {
    pub payload: std::sync::Arc<[u8]>,
    pub source_guid: [u8; 16],
    pub source_timestamp_ns: u64,
}

#[derive(Debug, Clone)]
pub struct IncomingSample {
    pub topic: DdsTopic,
    pub qos: TopicQoS,
    pub data: RtpsPayloadData,
}

#[derive(Debug, Clone)]
pub struct DiscoveredType {
    pub type_name: String,
    pub encoding: SchemaEncoding,
    pub schema_text: String,
    pub type_information: String,
    pub type_object: String,
}

/// Polled for new samples and newly discovered type schemas.
pub trait DdsSource {
    fn poll(&mut self) -> Option<IncomingSample>;
    fn discover_schemas(&mut self) -> Vec<DiscoveredType>;
}

/// Republishes recorded samples during replay.
pub trait DdsSink {
    fn ensure_writer(&mut self, topic: &DdsTopic) -> Result<(), GlueError>;
    fn publish(&mut self, topic: &DdsTopic, payload: &[u8], source_timestamp_ns: u64) -> Result<(), GlueError>;
}

/// In-memory [`DdsSource`] backed by an `mpsc` channel. Feeds tests and the
/// binaries' `--dry-run` / loopback mode without a real DDS participant.
pub struct ChannelDdsSource {
    samples: Receiver<IncomingSample>,
    schemas: Receiver<DiscoveredType>,
}

pub struct ChannelDdsSourceHandle {
    pub samples: Sender<IncomingSample>,
    pub schemas: Sender<DiscoveredType>,
}

impl ChannelDdsSource {
    pub fn new() -> (Self, ChannelDdsSourceHandle) {
        let (sample_tx, sample_rx) = std::sync::mpsc::channel();
        let (schema_tx, schema_rx) = std::sync::mpsc::channel();
        (
            Self { samples: sample_rx, schemas: schema_rx },
            ChannelDdsSourceHandle { samples: sample_tx, schemas: schema_tx },
        )
    }
}

impl DdsSource for ChannelDdsSource {
    fn poll(&mut self) -> Option<IncomingSample> {
        match self.samples.recv_timeout(Duration::from_millis(10)) {
            Ok(sample) => Some(sample),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn discover_schemas(&mut self) -> Vec<DiscoveredType> {
        let mut out = Vec::new();
        while let Ok(ty) = self.schemas.try_recv() {
            out.push(ty);
        }
        out
    }
}

/// In-memory [`DdsSink`], collecting published samples for inspection by
/// tests rather than actually transmitting them.
pub struct ChannelDdsSink {
    published: Sender<(DdsTopic, Vec<u8>, u64)>,
    writers: std::collections::HashSet<DdsTopic>,
}

impl ChannelDdsSink {
    pub fn new() -> (Self, Receiver<(DdsTopic, Vec<u8>, u64)>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (Self { published: tx, writers: std::collections::HashSet::new() }, rx)
    }
}

impl DdsSink for ChannelDdsSink {
    fn ensure_writer(&mut self, topic: &DdsTopic) -> Result<(), GlueError> {
        self.writers.insert(topic.clone());
        Ok(())
    }

    fn publish(&mut self, topic: &DdsTopic, payload: &[u8], source_timestamp_ns: u64) -> Result<(), GlueError> {
        if !self.writers.contains(topic) {
            return Err(GlueError::WriterCreationFailed(topic.topic_name.clone()));
        }
        self.published
            .send((topic.clone(), payload.to_vec(), source_timestamp_ns))
            .map_err(|SendError(_)| GlueError::Disconnected)
    }
}
