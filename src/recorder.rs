// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The recorder orchestrator: constructs writers and handlers from a
//! [`RecorderConfig`], wires them into a [`HandlerContextCollection`], and
//! fans DDS-side samples/schemas into them from a background poll thread.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::file_tracker::{FileTracker, FileTrackerConfig, FileTrackerError};
use crate::filter::{TopicFilter, TypeFilter};
use crate::glue::DdsSource;
use crate::handler::{BaseHandler, HandlerConfig, HandlerError};
use crate::handler_context::{HandlerContextCollection, HandlerContextError};
use crate::monitor::{MonitorEvent, MonitorEventKind, MonitorSink, TracingMonitorSink};
use crate::types::HandlerKind;
use crate::writer::mcap::McapWriter;
use crate::writer::sql::SqlWriter;
use crate::writer::WriterError;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    FileTracker(#[from] FileTrackerError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    HandlerContext(#[from] HandlerContextError),

    #[error("recorder is not recording")]
    NotRecording,

    #[error("recorder is already recording")]
    AlreadyRecording,

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Plain, `serde`-deserializable configuration. JSON parsing and CLI
/// argument handling live in the binaries, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub domain_id: u32,
    pub output_directory: PathBuf,
    pub filename_stem: String,
    pub enable_mcap: bool,
    pub enable_sql: bool,
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub rotation_enabled: bool,
    pub prepend_timestamp: bool,
    pub buffer_size: usize,
    pub max_pending_samples: usize,
    pub only_with_schema: bool,
    pub event_window_secs: u64,
    pub cleanup_period_secs: u64,
    /// Shared thread-pool size for the DDS transport; unused by the core
    /// itself but threaded through so a real binary can size its executor.
    pub thread_pool_size: usize,
    pub topic_include: Option<Vec<String>>,
    pub topic_exclude: Option<Vec<String>>,
    pub type_include: Option<Vec<String>>,
    pub type_exclude: Option<Vec<String>>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            domain_id: 0,
            output_directory: PathBuf::from("."),
            filename_stem: "recording".to_string(),
            enable_mcap: true,
            enable_sql: false,
            max_file_size: 100 * 1024 * 1024,
            max_total_size: 1024 * 1024 * 1024,
            rotation_enabled: true,
            prepend_timestamp: true,
            buffer_size: 256,
            max_pending_samples: 64,
            only_with_schema: false,
            event_window_secs: 5,
            cleanup_period_secs: 1,
            thread_pool_size: 12,
            topic_include: None,
            topic_exclude: None,
            type_include: None,
            type_exclude: None,
        }
    }
}

impl RecorderConfig {
    fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            buffer_size: self.buffer_size,
            max_pending_samples: self.max_pending_samples,
            only_with_schema: self.only_with_schema,
            event_window: Duration::from_secs(self.event_window_secs),
            cleanup_period: Duration::from_secs(self.cleanup_period_secs),
        }
    }

    fn topic_filter(&self) -> Option<TopicFilter> {
        if let Some(patterns) = &self.topic_include {
            Some(TopicFilter::include(patterns.clone()))
        } else {
            self.topic_exclude.clone().map(TopicFilter::exclude)
        }
    }

    fn type_filter(&self) -> Option<TypeFilter> {
        if let Some(patterns) = &self.type_include {
            Some(TypeFilter::include(patterns.clone()))
        } else {
            self.type_exclude.clone().map(TypeFilter::exclude)
        }
    }

    fn file_tracker_config(&self, extension: &str) -> FileTrackerConfig {
        FileTrackerConfig {
            directory: self.output_directory.clone(),
            filename_stem: self.filename_stem.clone(),
            extension: extension.to_string(),
            max_file_size: self.max_file_size,
            max_total_size: self.max_total_size,
            prepend_timestamp: self.prepend_timestamp,
            rotation_enabled: self.rotation_enabled,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RecordingStats {
    pub disk_full_events: u64,
}

/// Constructs the writer/handler stack from a [`RecorderConfig`] and fans
/// DDS samples into it. Generic over the DDS transport so a production
/// binary can plug in a real participant.
pub struct Recorder<S: DdsSource + Send + 'static> {
    config: RecorderConfig,
    handlers: Arc<HandlerContextCollection>,
    monitor: Arc<dyn MonitorSink>,
    topic_filter: Option<TopicFilter>,
    type_filter: Option<TypeFilter>,
    source: Arc<Mutex<S>>,
    poll_thread: Option<JoinHandle<()>>,
    poll_stop: Arc<AtomicBool>,
    stats: Arc<Mutex<RecordingStats>>,
}

impl<S: DdsSource + Send + 'static> Recorder<S> {
    pub fn new(config: RecorderConfig, source: S) -> Result<Self, RecorderError> {
        Self::with_monitor(config, source, Arc::new(TracingMonitorSink))
    }

    pub fn with_monitor(
        config: RecorderConfig,
        source: S,
        monitor: Arc<dyn MonitorSink>,
    ) -> Result<Self, RecorderError> {
        if !config.enable_mcap && !config.enable_sql {
            return Err(RecorderError::Configuration(
                "at least one of enable_mcap/enable_sql must be set".to_string(),
            ));
        }

        std::fs::create_dir_all(&config.output_directory)?;

        let handlers = Arc::new(HandlerContextCollection::new());

        if config.enable_mcap {
            let tracker = Arc::new(FileTracker::new(config.file_tracker_config(".mcap")));
            let writer = Box::new(McapWriter::new(tracker, config.max_file_size));
            let handler = BaseHandler::new(config.handler_config(), writer, Arc::clone(&monitor));
            handlers.init_handler_context(HandlerKind::Mcap, handler)?;
        }

        if config.enable_sql {
            let tracker = Arc::new(FileTracker::new(config.file_tracker_config(".db")));
            let writer = Box::new(SqlWriter::new(tracker, config.max_file_size, config.rotation_enabled));
            let handler = BaseHandler::new(config.handler_config(), writer, Arc::clone(&monitor));
            handlers.init_handler_context(HandlerKind::Sql, handler)?;
        }

        let topic_filter = config.topic_filter();
        let type_filter = config.type_filter();

        Ok(Self {
            config,
            handlers,
            monitor,
            topic_filter,
            type_filter,
            source: Arc::new(Mutex::new(source)),
            poll_thread: None,
            poll_stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(RecordingStats::default())),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn stats(&self) -> RecordingStats {
        *self.stats.lock().unwrap()
    }

    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.poll_thread.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        self.handlers.start_nts()?;

        self.poll_stop.store(false, Ordering::Release);
        let handlers = Arc::clone(&self.handlers);
        let source = Arc::clone(&self.source);
        let stop = Arc::clone(&self.poll_stop);
        let monitor = Arc::clone(&self.monitor);
        let stats = Arc::clone(&self.stats);
        let topic_filter = self.topic_filter.clone();
        let type_filter = self.type_filter.clone();

        self.poll_thread = Some(std::thread::spawn(move || {
            poll_loop(source, handlers, monitor, stats, stop, topic_filter, type_filter);
        }));
        Ok(())
    }

    pub fn pause(&self) -> Result<(), RecorderError> {
        self.handlers.pause_nts()?;
        Ok(())
    }

    pub fn trigger_event(&self) {
        self.handlers.trigger_event_nts();
    }

    pub fn stop(&mut self) -> Result<(), RecorderError> {
        if self.poll_thread.is_none() {
            return Err(RecorderError::NotRecording);
        }
        self.poll_stop.store(true, Ordering::Release);
        if let Some(handle) = self.poll_thread.take() {
            let _ = handle.join();
        }
        self.handlers.stop_nts()?;
        Ok(())
    }

    pub fn monitor_event(&self, kind: MonitorEventKind, detail: impl Into<String>) {
        self.monitor.emit(MonitorEvent { kind, detail: detail.into() });
    }
}

fn poll_loop<S: DdsSource + Send>(
    source: Arc<Mutex<S>>,
    handlers: Arc<HandlerContextCollection>,
    monitor: Arc<dyn MonitorSink>,
    stats: Arc<Mutex<RecordingStats>>,
    stop: Arc<AtomicBool>,
    topic_filter: Option<TopicFilter>,
    type_filter: Option<TypeFilter>,
) {
    while !stop.load(Ordering::Acquire) {
        let (discovered, incoming) = {
            let mut source = source.lock().unwrap();
            (source.discover_schemas(), source.poll())
        };

        for kind in [HandlerKind::Mcap, HandlerKind::Sql] {
            let Some(handler) = handlers.get(kind) else { continue };
            for ty in &discovered {
                if let Err(e) = handler.add_schema(
                    &ty.type_name,
                    ty.encoding,
                    &ty.schema_text,
                    &ty.type_information,
                    &ty.type_object,
                ) {
                    tracing::error!(error = %e, type_name = %ty.type_name, "add_schema failed");
                    monitor.emit(MonitorEvent {
                        kind: MonitorEventKind::TypeMismatch,
                        detail: ty.type_name.clone(),
                    });
                }
            }
        }

        if let Some(sample) = incoming {
            if let Some(filter) = &topic_filter {
                if !filter.matches(&sample.topic.topic_name) {
                    continue;
                }
            }
            if let Some(filter) = &type_filter {
                if !filter.matches(&sample.topic.type_name) {
                    continue;
                }
            }
            for kind in [HandlerKind::Mcap, HandlerKind::Sql] {
                let Some(handler) = handlers.get(kind) else { continue };
                let result = handler.add_data(
                    &sample.topic.topic_name,
                    &sample.topic.type_name,
                    &sample.qos,
                    Arc::clone(&sample.data.payload),
                    sample.data.source_guid,
                    sample.data.source_timestamp_ns,
                    sample.data.source_timestamp_ns,
                );
                match result {
                    Err(HandlerError::Writer(WriterError::DiskFull)) => {
                        let mut s = stats.lock().unwrap();
                        s.disk_full_events += 1;
                        monitor.emit(MonitorEvent {
                            kind: MonitorEventKind::DiskFull,
                            detail: sample.topic.topic_name.clone(),
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "add_data failed"),
                    Ok(()) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glue::ChannelDdsSource;
    use tempfile::tempdir;

    #[test]
    fn construct_and_start_stop_mcap_recorder() {
        let dir = tempdir().unwrap();
        let (source, _handle) = ChannelDdsSource::new();
        let config = RecorderConfig {
            output_directory: dir.path().to_path_buf(),
            ..RecorderConfig::default()
        };
        let mut recorder = Recorder::new(config, source).unwrap();
        recorder.start().unwrap();
        recorder.pause().unwrap();
        recorder.stop().unwrap();
    }

    #[test]
    fn requires_at_least_one_format() {
        let dir = tempdir().unwrap();
        let (source, _handle) = ChannelDdsSource::new();
        let config = RecorderConfig {
            output_directory: dir.path().to_path_buf(),
            enable_mcap: false,
            enable_sql: false,
            ..RecorderConfig::default()
        };
        let err = Recorder::new(config, source).unwrap_err();
        assert!(matches!(err, RecorderError::Configuration(_)));
    }

    #[test]
    fn disk_full_is_reported_exactly_once_and_stops_growing() {
        use crate::glue::{DdsTopic, DiscoveredType, IncomingSample, RtpsPayloadData};
        use crate::types::SchemaEncoding;

        let dir = tempdir().unwrap();
        let (source, handle) = ChannelDdsSource::new();
        let config = RecorderConfig {
            output_directory: dir.path().to_path_buf(),
            max_file_size: 200,
            max_total_size: 200,
            rotation_enabled: false,
            buffer_size: 1,
            max_pending_samples: 0,
            ..RecorderConfig::default()
        };
        let mut recorder = Recorder::new(config, source).unwrap();
        recorder.start().unwrap();

        use crate::types::TopicQoS;
        let topic = DdsTopic { topic_name: "/chatter".to_string(), type_name: "Hello".to_string() };
        handle
            .schemas
            .send(DiscoveredType {
                type_name: topic.type_name.clone(),
                encoding: SchemaEncoding::Ros2Msg,
                schema_text: "string data".to_string(),
                type_information: String::new(),
                type_object: String::new(),
            })
            .unwrap();

        // One small sample to force channel/schema creation, then a run of
        // oversized ones that blow the tiny file/disk budget repeatedly.
        for i in 0..20u64 {
            let payload = if i == 0 { vec![0u8; 4] } else { vec![0u8; 4096] };
            handle
                .samples
                .send(IncomingSample {
                    topic: topic.clone(),
                    qos: TopicQoS::default(),
                    data: RtpsPayloadData {
                        payload: Arc::from(payload.into_boxed_slice()),
                        source_guid: [0; 16],
                        source_timestamp_ns: i * 1_000,
                    },
                })
                .unwrap();
        }

        // Give the poll thread time to drain the channel before stopping.
        std::thread::sleep(Duration::from_millis(200));
        recorder.stop().unwrap();

        let stats = recorder.stats();
        assert_eq!(stats.disk_full_events, 1);
    }
}
