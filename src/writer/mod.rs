// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output writers: one [`Writer`] owns a [`crate::file_tracker::FileTracker`]
//! and a [`crate::size_tracker::SizeTracker`], and knows how to encode
//! schemas, channels, messages, and the dynamic-types sidecar for its
//! concrete container format.

pub mod mcap;
pub mod sql;

use thiserror::Error;

use crate::file_tracker::FileTrackerError;
use crate::size_tracker::SizeTrackerError;
use crate::types::{Channel, DynamicTypesCollection, Message, Schema};

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    FileTracker(#[from] FileTrackerError),

    #[error("mcap error: {0}")]
    Mcap(String),

    #[error("sql error: {0}")]
    Sql(String),

    #[error("disk full, writer disabled")]
    DiskFull,

    #[error("inconsistency: {0}")]
    Inconsistency(String),
}

impl From<SizeTrackerError> for WriterError {
    fn from(e: SizeTrackerError) -> Self {
        match e {
            SizeTrackerError::FullFile { required } => {
                WriterError::Inconsistency(format!("unexpected FullFile escaped rotation: required={required}"))
            }
            SizeTrackerError::FullDisk => WriterError::DiskFull,
        }
    }
}

/// Common surface every output writer implements. The recorder's handlers
/// are generic over this trait, not over a concrete MCAP/SQL type.
pub trait Writer: Send {
    /// Opens the first output file. No-op if already enabled.
    fn enable(&mut self) -> Result<(), WriterError>;

    /// Flushes and closes the current file. No-op if already disabled.
    fn disable(&mut self) -> Result<(), WriterError>;

    fn is_enabled(&self) -> bool;

    /// Writes (or re-emits, after rotation) a schema record.
    fn write_schema(&mut self, schema: &Schema) -> Result<(), WriterError>;

    /// Writes (or re-emits, after rotation) a channel record.
    fn write_channel(&mut self, channel: &Channel) -> Result<(), WriterError>;

    /// Writes a single message.
    fn write_message(&mut self, message: &Message) -> Result<(), WriterError>;

    /// Replaces the dynamic-types sidecar snapshot with the current
    /// collection. Concrete writers may defer the actual on-disk rewrite
    /// until file close.
    fn update_dynamic_types(&mut self, collection: &DynamicTypesCollection) -> Result<(), WriterError>;
}
