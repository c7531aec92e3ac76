// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The recorder's state machine: buffers incoming samples, resolves them
//! against late-arriving schemas, and flushes to an output [`Writer`].
//!
//! A single coarse mutex guards `samples_buffer`, the pending-sample queues,
//! the schema/channel maps and the dynamic-types collection, mirroring the
//! teacher's "one mutex per handler" policy. The event thread (alive only
//! while [`HandlerState::Paused`]) uses a second, narrower mutex purely to
//! guard the wake signal.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::monitor::{MonitorEvent, MonitorEventKind, MonitorSink};
use crate::types::{Channel, DynamicTypeEntry, DynamicTypesCollection, Message, Schema, SchemaEncoding, TopicQoS};
use crate::writer::{Writer, WriterError};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("no schema available for type and only_with_schema is set")]
    Inconsistency,

    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventSignal {
    Untriggered,
    Triggered,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub buffer_size: usize,
    pub max_pending_samples: usize,
    pub only_with_schema: bool,
    pub event_window: Duration,
    pub cleanup_period: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            max_pending_samples: 64,
            only_with_schema: false,
            event_window: Duration::from_secs(5),
            cleanup_period: Duration::from_secs(1),
        }
    }
}

/// A sample queued while its type's schema has not yet arrived. Keeps the
/// originating topic name and QoS alongside the message so the channel
/// created on resolution is bound to the correct topic, not just the type.
struct PendingSample {
    topic_name: String,
    qos: TopicQoS,
    message: Message,
}

struct Data {
    state: HandlerState,
    samples_buffer: Vec<Message>,
    pending_samples: HashMap<String, VecDeque<PendingSample>>,
    pending_samples_paused: HashMap<String, VecDeque<PendingSample>>,
    schemas: HashMap<String, Schema>,
    channels: HashMap<String, Channel>,
    received_types: HashSet<String>,
    dynamic_types: DynamicTypesCollection,
    next_schema_id: u16,
    next_channel_id: u16,
    next_sequence: u64,
    /// Latched once the writer reports [`WriterError::DiskFull`]. Once set,
    /// further samples are dropped silently so the caller observes the
    /// disk-full condition exactly once instead of on every subsequent write.
    disk_full: bool,
}

struct EventState {
    signal: EventSignal,
}

/// Owns the shared mutex, the event condition variable, and the writer this
/// handler drives.
pub struct BaseHandler {
    config: HandlerConfig,
    data: Mutex<Data>,
    writer: Mutex<Box<dyn Writer>>,
    monitor: Arc<dyn MonitorSink>,
    event_mutex: Mutex<EventState>,
    event_cv: Condvar,
    event_thread: Mutex<Option<JoinHandle<()>>>,
}

impl BaseHandler {
    pub fn new(config: HandlerConfig, writer: Box<dyn Writer>, monitor: Arc<dyn MonitorSink>) -> Arc<Self> {
        Arc::new(Self {
            config,
            data: Mutex::new(Data {
                state: HandlerState::Stopped,
                samples_buffer: Vec::new(),
                pending_samples: HashMap::new(),
                pending_samples_paused: HashMap::new(),
                schemas: HashMap::new(),
                channels: HashMap::new(),
                received_types: HashSet::new(),
                dynamic_types: DynamicTypesCollection::default(),
                next_schema_id: 1,
                next_channel_id: 1,
                next_sequence: 0,
                disk_full: false,
            }),
            writer: Mutex::new(writer),
            monitor,
            event_mutex: Mutex::new(EventState { signal: EventSignal::Untriggered }),
            event_cv: Condvar::new(),
            event_thread: Mutex::new(None),
        })
    }

    pub fn state(&self) -> HandlerState {
        self.data.lock().unwrap().state
    }

    // ---- command transitions -------------------------------------------------

    pub fn start(self: &Arc<Self>) -> Result<(), HandlerError> {
        let mut data = self.data.lock().unwrap();
        match data.state {
            HandlerState::Stopped => {
                self.writer.lock().unwrap().enable()?;
                data.state = HandlerState::Running;
                Ok(())
            }
            HandlerState::Paused => {
                self.stop_event_thread(&mut data);
                data.state = HandlerState::Running;
                Ok(())
            }
            HandlerState::Running => {
                tracing::warn!("start() called while already running");
                Ok(())
            }
        }
    }

    pub fn pause(self: &Arc<Self>) -> Result<(), HandlerError> {
        let mut data = self.data.lock().unwrap();
        match data.state {
            HandlerState::Stopped => {
                self.writer.lock().unwrap().enable()?;
                data.state = HandlerState::Paused;
                drop(data);
                self.spawn_event_thread();
                Ok(())
            }
            HandlerState::Running => {
                self.flush_buffer(&mut data)?;
                data.state = HandlerState::Paused;
                drop(data);
                self.spawn_event_thread();
                Ok(())
            }
            HandlerState::Paused => {
                tracing::warn!("pause() called while already paused");
                Ok(())
            }
        }
    }

    pub fn stop(self: &Arc<Self>) -> Result<(), HandlerError> {
        let mut data = self.data.lock().unwrap();
        match data.state {
            HandlerState::Running => {
                self.flush_buffer(&mut data)?;
                data.state = HandlerState::Stopped;
                Ok(())
            }
            HandlerState::Paused => {
                self.stop_event_thread(&mut data);
                data.state = HandlerState::Stopped;
                Ok(())
            }
            HandlerState::Stopped => Ok(()),
        }
    }

    pub fn trigger_event(&self) {
        let data = self.data.lock().unwrap();
        if data.state != HandlerState::Paused {
            tracing::warn!("trigger_event() called outside PAUSED state");
            return;
        }
        drop(data);
        let mut ev = self.event_mutex.lock().unwrap();
        ev.signal = EventSignal::Triggered;
        self.event_cv.notify_all();
    }

    fn spawn_event_thread(self: &Arc<Self>) {
        let handler = Arc::clone(self);
        let mut slot = self.event_thread.lock().unwrap();
        *slot = Some(std::thread::spawn(move || handler.event_thread_routine()));
    }

    fn stop_event_thread(&self, _data: &mut Data) {
        {
            let mut ev = self.event_mutex.lock().unwrap();
            ev.signal = EventSignal::Stopped;
            self.event_cv.notify_all();
        }
        if let Some(handle) = self.event_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        let mut data = self.data.lock().unwrap();
        data.samples_buffer.clear();
        data.pending_samples_paused.clear();
    }

    fn event_thread_routine(self: Arc<Self>) {
        loop {
            let signal = {
                let ev = self.event_mutex.lock().unwrap();
                let (ev, timed_out) = self
                    .event_cv
                    .wait_timeout_while(ev, self.config.cleanup_period, |e| e.signal == EventSignal::Untriggered)
                    .unwrap();
                let _ = timed_out;
                ev.signal
            };

            match signal {
                EventSignal::Stopped => return,
                EventSignal::Triggered => {
                    let mut data = self.data.lock().unwrap();
                    self.purge_outdated(&mut data);
                    let _ = self.flush_buffer(&mut data);
                    let mut ev = self.event_mutex.lock().unwrap();
                    ev.signal = EventSignal::Untriggered;
                }
                EventSignal::Untriggered => {
                    let mut data = self.data.lock().unwrap();
                    self.purge_outdated(&mut data);
                }
            }
        }
    }

    fn purge_outdated(&self, data: &mut Data) {
        let now = now_ns();
        let window = self.config.event_window.as_nanos() as u64;
        let cutoff = now.saturating_sub(window);
        data.samples_buffer.retain(|m| m.log_time_ns >= cutoff);
    }

    // ---- data path -------------------------------------------------------

    /// Ingests one sample arriving for `topic_name`/`type_name`.
    pub fn add_data(
        &self,
        topic_name: &str,
        type_name: &str,
        qos: &TopicQoS,
        payload: Arc<[u8]>,
        source_guid: [u8; 16],
        log_time_ns: u64,
        publish_time_ns: u64,
    ) -> Result<(), HandlerError> {
        let mut data = self.data.lock().unwrap();

        if data.state == HandlerState::Stopped || data.disk_full {
            return Ok(());
        }

        let sequence = data.next_sequence;
        data.next_sequence += 1;

        if let Some(channel) = data.channels.get(topic_name).cloned() {
            let message = Message {
                sequence,
                channel_id: channel.id,
                log_time_ns,
                publish_time_ns,
                source_guid,
                payload,
            };
            return self.admit_known(&mut data, message);
        }

        if self.config.max_pending_samples == 0 {
            if self.config.only_with_schema {
                return Ok(());
            }
            let channel = self.ensure_blank_channel(&mut data, topic_name, type_name, qos)?;
            let message = Message {
                sequence,
                channel_id: channel.id,
                log_time_ns,
                publish_time_ns,
                source_guid,
                payload,
            };
            if let Err(e) = self.writer.lock().unwrap().write_message(&message) {
                return Err(self.latch_disk_full(&mut data, e));
            }
            return Ok(());
        }

        let paused = data.state == HandlerState::Paused;
        let message = Message {
            sequence,
            channel_id: 0,
            log_time_ns,
            publish_time_ns,
            source_guid,
            payload,
        };
        let pending = PendingSample { topic_name: topic_name.to_string(), qos: qos.clone(), message };

        let queue = if paused {
            data.pending_samples_paused.entry(type_name.to_string()).or_default()
        } else {
            data.pending_samples.entry(type_name.to_string()).or_default()
        };
        queue.push_back(pending);

        if queue.len() > self.config.max_pending_samples {
            let oldest = queue.pop_front();
            if let Some(oldest) = oldest {
                if !self.config.only_with_schema {
                    let channel =
                        self.ensure_blank_channel(&mut data, &oldest.topic_name, type_name, &oldest.qos)?;
                    let mut message = oldest.message;
                    message.channel_id = channel.id;
                    self.admit_known(&mut data, message)?;
                }
            }
        }

        Ok(())
    }

    fn admit_known(&self, data: &mut Data, message: Message) -> Result<(), HandlerError> {
        match data.state {
            HandlerState::Stopped => Ok(()),
            HandlerState::Running => {
                data.samples_buffer.push(message);
                if data.samples_buffer.len() >= self.config.buffer_size {
                    self.flush_buffer(data)?;
                }
                Ok(())
            }
            HandlerState::Paused => {
                data.samples_buffer.push(message);
                Ok(())
            }
        }
    }

    fn flush_buffer(&self, data: &mut Data) -> Result<(), HandlerError> {
        if data.samples_buffer.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().unwrap();
        for message in data.samples_buffer.drain(..) {
            if let Err(e) = writer.write_message(&message) {
                drop(writer);
                data.samples_buffer.clear();
                return Err(self.latch_disk_full(data, e));
            }
        }
        Ok(())
    }

    /// Records `err` as the reason recording stopped if it is a disk-full
    /// condition, so later `add_data` calls are dropped silently rather than
    /// re-attempting a write that will only fail the same way again.
    fn latch_disk_full(&self, data: &mut Data, err: WriterError) -> HandlerError {
        if matches!(err, WriterError::DiskFull) {
            data.disk_full = true;
        }
        HandlerError::Writer(err)
    }

    fn ensure_blank_channel(
        &self,
        data: &mut Data,
        topic_name: &str,
        type_name: &str,
        qos: &TopicQoS,
    ) -> Result<Channel, HandlerError> {
        if let Some(channel) = data.channels.get(topic_name) {
            return Ok(channel.clone());
        }

        let is_new = !data.schemas.contains_key(type_name);
        let next_id = data.next_schema_id;
        let schema = data
            .schemas
            .entry(type_name.to_string())
            .or_insert_with(|| Schema::blank(next_id, type_name))
            .clone();
        if is_new {
            data.next_schema_id += 1;
        }

        if let Err(e) = self.writer.lock().unwrap().write_schema(&schema) {
            return Err(self.latch_disk_full(data, e));
        }

        let channel_id = data.next_channel_id;
        data.next_channel_id += 1;
        let channel = Channel {
            id: channel_id,
            topic_name: topic_name.to_string(),
            message_encoding: "cdr".to_string(),
            schema_id: schema.id,
            qos: qos.clone(),
            ros2_types: matches!(schema.encoding, SchemaEncoding::Ros2Msg),
        };
        if let Err(e) = self.writer.lock().unwrap().write_channel(&channel) {
            return Err(self.latch_disk_full(data, e));
        }
        data.channels.insert(topic_name.to_string(), channel.clone());
        Ok(channel)
    }

    /// Registers a concrete schema discovered for `type_name`. Idempotent:
    /// a second call with the same type leaves all state unchanged.
    pub fn add_schema(
        &self,
        type_name: &str,
        encoding: SchemaEncoding,
        schema_text: &str,
        type_information: &str,
        type_object: &str,
    ) -> Result<(), HandlerError> {
        let mut data = self.data.lock().unwrap();

        if data.received_types.contains(type_name) {
            return Ok(());
        }
        data.received_types.insert(type_name.to_string());

        // A blank placeholder schema may already be on disk for this type
        // (emitted by `ensure_blank_channel`/`ensure_blank_channel_for_type`
        // while samples arrived ahead of discovery). A schema record is
        // immutable once written, so the real schema gets its own fresh id
        // rather than reusing the blank one.
        let blank_id = data.schemas.get(type_name).filter(|s| s.is_blank()).map(|s| s.id);
        let id = match blank_id {
            Some(_) => {
                let id = data.next_schema_id;
                data.next_schema_id += 1;
                id
            }
            None => data
                .schemas
                .get(type_name)
                .map(|s| s.id)
                .unwrap_or_else(|| {
                    let id = data.next_schema_id;
                    data.next_schema_id += 1;
                    id
                }),
        };

        let schema = Schema {
            id,
            name: type_name.to_string(),
            encoding,
            data: schema_text.to_string(),
        };
        data.schemas.insert(type_name.to_string(), schema.clone());
        if let Err(e) = self.writer.lock().unwrap().write_schema(&schema) {
            return Err(self.latch_disk_full(&mut data, e));
        }

        if let Some(old_schema_id) = blank_id {
            self.reemit_channels_for_schema(&mut data, old_schema_id, &schema)?;
        }

        data.dynamic_types.insert(DynamicTypeEntry {
            type_name: type_name.to_string(),
            type_information: type_information.to_string(),
            type_object: type_object.to_string(),
        });
        let snapshot = data.dynamic_types.clone();
        self.writer.lock().unwrap().update_dynamic_types(&snapshot)?;

        if let Some(queue) = data.pending_samples.remove(type_name) {
            for pending in queue {
                let channel = self.ensure_blank_channel_for_type(&mut data, &pending.topic_name, &pending.qos, &schema)?;
                let mut message = pending.message;
                message.channel_id = channel.id;
                data.samples_buffer.push(message);
            }
        }
        // PAUSED pending entries flush directly rather than going through the
        // event window, since they were never subject to it while pending.
        if let Some(queue) = data.pending_samples_paused.remove(type_name) {
            for pending in queue {
                let channel = self.ensure_blank_channel_for_type(&mut data, &pending.topic_name, &pending.qos, &schema)?;
                let mut message = pending.message;
                message.channel_id = channel.id;
                data.samples_buffer.push(message);
            }
        }

        Ok(())
    }

    fn ensure_blank_channel_for_type(
        &self,
        data: &mut Data,
        topic_name: &str,
        qos: &TopicQoS,
        schema: &Schema,
    ) -> Result<Channel, HandlerError> {
        if let Some(channel) = data.channels.get(topic_name) {
            return Ok(channel.clone());
        }
        let channel_id = data.next_channel_id;
        data.next_channel_id += 1;
        let channel = Channel {
            id: channel_id,
            topic_name: topic_name.to_string(),
            message_encoding: "cdr".to_string(),
            schema_id: schema.id,
            qos: qos.clone(),
            ros2_types: matches!(schema.encoding, SchemaEncoding::Ros2Msg),
        };
        if let Err(e) = self.writer.lock().unwrap().write_channel(&channel) {
            return Err(self.latch_disk_full(data, e));
        }
        data.channels.insert(channel.topic_name.clone(), channel.clone());
        Ok(channel)
    }

    /// Re-emits every channel bound to `old_schema_id` against `schema`'s
    /// (new) id. A schema record is immutable once written, so upgrading a
    /// blank placeholder to its real text requires a fresh schema id and, per
    /// the rule that a new Channel is emitted whenever its bound schema id
    /// changes, a fresh channel record for each affected topic.
    fn reemit_channels_for_schema(
        &self,
        data: &mut Data,
        old_schema_id: u16,
        schema: &Schema,
    ) -> Result<(), HandlerError> {
        let topics: Vec<String> = data
            .channels
            .iter()
            .filter(|(_, c)| c.schema_id == old_schema_id)
            .map(|(topic_name, _)| topic_name.clone())
            .collect();

        for topic_name in topics {
            let Some(old) = data.channels.get(&topic_name).cloned() else { continue };
            let channel_id = data.next_channel_id;
            data.next_channel_id += 1;
            let channel = Channel {
                id: channel_id,
                topic_name: topic_name.clone(),
                message_encoding: old.message_encoding.clone(),
                schema_id: schema.id,
                qos: old.qos.clone(),
                ros2_types: matches!(schema.encoding, SchemaEncoding::Ros2Msg),
            };
            if let Err(e) = self.writer.lock().unwrap().write_channel(&channel) {
                return Err(self.latch_disk_full(data, e));
            }
            data.channels.insert(topic_name, channel);
        }
        Ok(())
    }

    pub fn emit_monitor(&self, kind: MonitorEventKind, detail: impl Into<String>) {
        self.monitor.emit(MonitorEvent { kind, detail: detail.into() });
    }
}

fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::NullMonitorSink;
    use crate::writer::mcap::McapWriter;
    use crate::file_tracker::{FileTracker, FileTrackerConfig};
    use tempfile::tempdir;

    fn handler(dir: &std::path::Path, config: HandlerConfig) -> Arc<BaseHandler> {
        let tracker = Arc::new(FileTracker::new(FileTrackerConfig {
            directory: dir.to_path_buf(),
            filename_stem: "rec".to_string(),
            extension: ".mcap".to_string(),
            max_file_size: 1_000_000,
            max_total_size: 10_000_000,
            prepend_timestamp: false,
            rotation_enabled: false,
        }));
        let writer = Box::new(McapWriter::new(tracker, 1_000_000));
        BaseHandler::new(config, writer, Arc::new(NullMonitorSink))
    }

    #[test]
    fn s1_tiny_recording_flushes_every_message() {
        let dir = tempdir().unwrap();
        let h = handler(
            dir.path(),
            HandlerConfig {
                buffer_size: 1,
                max_pending_samples: 0,
                only_with_schema: false,
                ..HandlerConfig::default()
            },
        );
        h.start().unwrap();
        h.add_schema("Hello", SchemaEncoding::Ros2Msg, "string data", "ti", "to").unwrap();

        for (i, payload) in [[0x01u8], [0x02], [0x03]].into_iter().enumerate() {
            h.add_data(
                "/chatter",
                "Hello",
                &TopicQoS::default(),
                Arc::from(payload.to_vec().into_boxed_slice()),
                [0; 16],
                1_000 * (i as u64 + 1),
                1_000 * (i as u64 + 1),
            )
            .unwrap();
        }
        h.stop().unwrap();
    }

    #[test]
    fn pending_samples_are_bounded() {
        let dir = tempdir().unwrap();
        let h = handler(
            dir.path(),
            HandlerConfig {
                buffer_size: 16,
                max_pending_samples: 2,
                only_with_schema: false,
                ..HandlerConfig::default()
            },
        );
        h.start().unwrap();

        for i in 0..4u8 {
            h.add_data(
                "/x",
                "Unresolved",
                &TopicQoS::default(),
                Arc::from(vec![i].into_boxed_slice()),
                [0; 16],
                i as u64 * 1000,
                i as u64 * 1000,
            )
            .unwrap();
        }

        let data = h.data.lock().unwrap();
        let pending = data.pending_samples.get("Unresolved").map(|q| q.len()).unwrap_or(0);
        assert!(pending <= 2);
    }

    /// S2: samples that arrive before their schema are held pending, then
    /// flushed with the correct channel once the schema shows up.
    #[test]
    fn s2_late_schema_resolves_pending_samples() {
        let dir = tempdir().unwrap();
        let h = handler(
            dir.path(),
            HandlerConfig { buffer_size: 16, max_pending_samples: 8, only_with_schema: false, ..HandlerConfig::default() },
        );
        h.start().unwrap();

        for i in 0..3u8 {
            h.add_data(
                "/late",
                "LateType",
                &TopicQoS::default(),
                Arc::from(vec![i].into_boxed_slice()),
                [0; 16],
                i as u64 * 1000,
                i as u64 * 1000,
            )
            .unwrap();
        }
        {
            let data = h.data.lock().unwrap();
            assert_eq!(data.pending_samples.get("LateType").map(|q| q.len()), Some(3));
            assert!(data.channels.get("/late").is_none());
        }

        h.add_schema("LateType", SchemaEncoding::Ros2Msg, "string data", "ti", "to").unwrap();

        let data = h.data.lock().unwrap();
        assert!(data.pending_samples.get("LateType").is_none());
        assert_eq!(data.samples_buffer.len(), 3);
    }

    /// Two distinct topics sharing one type must resolve into two distinct
    /// channels, not collapse onto a single type-named channel.
    #[test]
    fn late_schema_preserves_distinct_topics_of_same_type() {
        let dir = tempdir().unwrap();
        let h = handler(
            dir.path(),
            HandlerConfig { buffer_size: 16, max_pending_samples: 8, only_with_schema: false, ..HandlerConfig::default() },
        );
        h.start().unwrap();

        h.add_data("/a", "Shared", &TopicQoS::default(), Arc::from(vec![1u8].into_boxed_slice()), [0; 16], 0, 0).unwrap();
        h.add_data("/b", "Shared", &TopicQoS::default(), Arc::from(vec![2u8].into_boxed_slice()), [0; 16], 0, 0).unwrap();

        h.add_schema("Shared", SchemaEncoding::Ros2Msg, "string data", "ti", "to").unwrap();

        let data = h.data.lock().unwrap();
        let channel_a = data.channels.get("/a").expect("channel for /a");
        let channel_b = data.channels.get("/b").expect("channel for /b");
        assert_ne!(channel_a.id, channel_b.id);
        assert_eq!(channel_a.topic_name, "/a");
        assert_eq!(channel_b.topic_name, "/b");
    }

    /// A blank channel opened for a sample that arrived before its schema
    /// (`max_pending_samples == 0`) must be re-emitted under a fresh id once
    /// the real schema shows up, since the on-disk blank schema record can't
    /// be mutated in place.
    #[test]
    fn blank_channel_is_reemitted_when_real_schema_arrives() {
        let dir = tempdir().unwrap();
        let h = handler(
            dir.path(),
            HandlerConfig { buffer_size: 16, max_pending_samples: 0, only_with_schema: false, ..HandlerConfig::default() },
        );
        h.start().unwrap();

        h.add_data("/blank", "Unresolved", &TopicQoS::default(), Arc::from(vec![1u8].into_boxed_slice()), [0; 16], 0, 0).unwrap();

        let (blank_channel_id, blank_schema_id) = {
            let data = h.data.lock().unwrap();
            let channel = data.channels.get("/blank").expect("blank channel exists");
            let schema = data.schemas.get("Unresolved").expect("blank schema exists");
            assert!(schema.is_blank());
            (channel.id, channel.schema_id)
        };

        h.add_schema("Unresolved", SchemaEncoding::Ros2Msg, "string data", "ti", "to").unwrap();

        let data = h.data.lock().unwrap();
        let channel = data.channels.get("/blank").expect("channel still present");
        let schema = data.schemas.get("Unresolved").expect("schema still present");
        assert!(!schema.is_blank());
        assert_ne!(schema.id, blank_schema_id);
        assert_eq!(channel.schema_id, schema.id);
        assert_ne!(channel.id, blank_channel_id);
        assert_eq!(channel.topic_name, "/blank");
    }

    /// S4: while PAUSED, samples accumulate in the buffer and only the most
    /// recent `event_window` of them survive a triggered flush.
    #[test]
    fn s4_paused_event_window_purges_stale_samples() {
        let dir = tempdir().unwrap();
        let h = handler(
            dir.path(),
            HandlerConfig {
                buffer_size: 256,
                max_pending_samples: 0,
                only_with_schema: false,
                event_window: Duration::from_millis(50),
                cleanup_period: Duration::from_millis(10),
            },
        );
        h.start().unwrap();
        h.add_schema("Hello", SchemaEncoding::Ros2Msg, "string data", "ti", "to").unwrap();
        h.pause().unwrap();
        assert_eq!(h.state(), HandlerState::Paused);

        let stale_ns = now_ns().saturating_sub(Duration::from_millis(200).as_nanos() as u64);
        h.add_data("/chatter", "Hello", &TopicQoS::default(), Arc::from(vec![0u8].into_boxed_slice()), [0; 16], stale_ns, stale_ns)
            .unwrap();

        let fresh_ns = now_ns();
        h.add_data("/chatter", "Hello", &TopicQoS::default(), Arc::from(vec![1u8].into_boxed_slice()), [0; 16], fresh_ns, fresh_ns)
            .unwrap();
        {
            let data = h.data.lock().unwrap();
            assert_eq!(data.samples_buffer.len(), 2);
        }

        // Let the event thread's background cleanup ticks purge the stale
        // entry without a trigger (which would also flush and drain).
        std::thread::sleep(Duration::from_millis(80));

        let data = h.data.lock().unwrap();
        assert!(data.samples_buffer.iter().all(|m| m.log_time_ns != stale_ns));
        assert!(data.samples_buffer.iter().any(|m| m.log_time_ns == fresh_ns));

        drop(data);
        h.stop().unwrap();
    }
}
