// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write-once registry of the enabled handlers, indexed by [`HandlerKind`].
//!
//! `init_handler_context` is the only mutating call and must run before any
//! of `start`/`stop`/`pause`/`trigger_event`/`reset_file_trackers`. After
//! that the collection is read-only and needs no synchronization on the
//! data path -- only an atomic flag guards the one-time initialization.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::handler::{BaseHandler, HandlerError};
use crate::types::HandlerKind;

#[derive(Debug, Error)]
pub enum HandlerContextError {
    #[error("handler kind {0:?} already initialized")]
    AlreadyInitialized(HandlerKind),

    #[error("mutation attempted after the collection was started")]
    PreconditionNotMet,

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

#[derive(Default)]
pub struct HandlerContextCollection {
    handlers: std::sync::Mutex<HashMap<HandlerKind, Arc<BaseHandler>>>,
    started: AtomicBool,
}

impl HandlerContextCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `kind`. The only mutating call permitted
    /// once the collection has started.
    pub fn init_handler_context(
        &self,
        kind: HandlerKind,
        handler: Arc<BaseHandler>,
    ) -> Result<(), HandlerContextError> {
        if self.started.load(Ordering::Acquire) {
            return Err(HandlerContextError::PreconditionNotMet);
        }
        let mut handlers = self.handlers.lock().unwrap();
        if handlers.contains_key(&kind) {
            return Err(HandlerContextError::AlreadyInitialized(kind));
        }
        handlers.insert(kind, handler);
        Ok(())
    }

    pub fn get(&self, kind: HandlerKind) -> Option<Arc<BaseHandler>> {
        self.handlers.lock().unwrap().get(&kind).cloned()
    }

    fn for_each(&self, mut f: impl FnMut(&Arc<BaseHandler>) -> Result<(), HandlerError>) -> Result<(), HandlerContextError> {
        let handlers = self.handlers.lock().unwrap();
        for handler in handlers.values() {
            f(handler)?;
        }
        Ok(())
    }

    pub fn start_nts(&self) -> Result<(), HandlerContextError> {
        self.started.store(true, Ordering::Release);
        self.for_each(|h| h.start())
    }

    pub fn pause_nts(&self) -> Result<(), HandlerContextError> {
        self.for_each(|h| h.pause())
    }

    pub fn stop_nts(&self) -> Result<(), HandlerContextError> {
        self.for_each(|h| h.stop())
    }

    pub fn trigger_event_nts(&self) {
        let handlers = self.handlers.lock().unwrap();
        for handler in handlers.values() {
            handler.trigger_event();
        }
    }

    pub fn reset_file_trackers_nts(&self) -> Result<(), HandlerContextError> {
        if self.started.load(Ordering::Acquire) {
            return Err(HandlerContextError::PreconditionNotMet);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_tracker::{FileTracker, FileTrackerConfig};
    use crate::handler::HandlerConfig;
    use crate::monitor::NullMonitorSink;
    use crate::writer::mcap::McapWriter;
    use tempfile::tempdir;

    #[test]
    fn double_init_same_kind_rejected() {
        let dir = tempdir().unwrap();
        let collection = HandlerContextCollection::new();

        let make_handler = || {
            let tracker = Arc::new(FileTracker::new(FileTrackerConfig {
                directory: dir.path().to_path_buf(),
                filename_stem: "rec".to_string(),
                extension: ".mcap".to_string(),
                max_file_size: 1_000_000,
                max_total_size: 10_000_000,
                prepend_timestamp: false,
                rotation_enabled: false,
            }));
            BaseHandler::new(
                HandlerConfig::default(),
                Box::new(McapWriter::new(tracker, 1_000_000)),
                Arc::new(NullMonitorSink),
            )
        };

        collection.init_handler_context(HandlerKind::Mcap, make_handler()).unwrap();
        let err = collection
            .init_handler_context(HandlerKind::Mcap, make_handler())
            .unwrap_err();
        assert!(matches!(err, HandlerContextError::AlreadyInitialized(_)));
    }

    #[test]
    fn mutation_after_start_rejected() {
        let dir = tempdir().unwrap();
        let collection = HandlerContextCollection::new();
        let tracker = Arc::new(FileTracker::new(FileTrackerConfig {
            directory: dir.path().to_path_buf(),
            filename_stem: "rec".to_string(),
            extension: ".mcap".to_string(),
            max_file_size: 1_000_000,
            max_total_size: 10_000_000,
            prepend_timestamp: false,
            rotation_enabled: false,
        }));
        let handler = BaseHandler::new(
            HandlerConfig::default(),
            Box::new(McapWriter::new(tracker, 1_000_000)),
            Arc::new(NullMonitorSink),
        );
        collection.init_handler_context(HandlerKind::Mcap, handler).unwrap();
        collection.start_nts().unwrap();

        let err = collection.reset_file_trackers_nts().unwrap_err();
        assert!(matches!(err, HandlerContextError::PreconditionNotMet));
    }
}
