// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pre-write byte accounting shared by every output writer.
//!
//! Every record a writer wants to emit is priced *before* it is encoded, so a
//! writer never has to unwind a partially written record. The pricing
//! formulas mirror the on-disk MCAP encoding exactly; SQL writers use the
//! same tracker but price rows with their own (cheaper) formulas.

use std::collections::HashMap;

use thiserror::Error;

/// Fixed MCAP file overhead: header, summary offsets, statistics, chunk
/// index and data-end records that exist regardless of content.
pub const FILE_OVERHEAD: u64 = 315;

#[derive(Debug, Error)]
pub enum SizeTrackerError {
    #[error("file is full: {required} additional bytes required")]
    FullFile { required: u64 },

    #[error("disk is full: no space remains for a new file")]
    FullDisk,
}

/// The object kinds that get priced and written through a [`SizeTracker`].
///
/// Only schema/channel/attachment/metadata additions count toward
/// `min_size` -- the irreducible floor every new file must reserve so that
/// already-known schemas/channels can be replayed at the head of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizedObject {
    Message,
    Schema,
    Channel,
    Attachment,
    Metadata,
}

/// Pre-authorizes every byte a writer wants to commit against a file and
/// aggregate budget.
#[derive(Debug)]
pub struct SizeTracker {
    potential_size: u64,
    written_size: u64,
    min_size: u64,
    space_available: u64,
    enabled: bool,
    disk_full: bool,
}

impl Default for SizeTracker {
    fn default() -> Self {
        Self {
            potential_size: FILE_OVERHEAD,
            written_size: 0,
            min_size: FILE_OVERHEAD,
            space_available: 0,
            enabled: false,
            disk_full: false,
        }
    }
}

impl SizeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets counters for a freshly opened file and enables the tracker.
    pub fn init(&mut self, space_available: u64, safety_margin: u64) {
        self.potential_size = FILE_OVERHEAD + safety_margin;
        self.written_size = 0;
        self.min_size = FILE_OVERHEAD + safety_margin;
        self.space_available = space_available;
        self.enabled = true;
        self.disk_full = false;
    }

    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    pub fn potential_size(&self) -> u64 {
        self.potential_size
    }

    pub fn written_size(&self) -> u64 {
        self.written_size
    }

    pub fn disk_full(&self) -> bool {
        self.disk_full
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the on-disk size a record of `kind` with the given field
    /// lengths will occupy. `parts` are the variable-length field byte
    /// counts in the order used by each formula below.
    pub fn encoded_size(kind: SizedObject, parts: &[u64]) -> u64 {
        match kind {
            SizedObject::Message => {
                let payload_len = parts.first().copied().unwrap_or(0);
                31 + 8 + 8 + payload_len
            }
            SizedObject::Schema => {
                let (name, encoding, data) = (
                    parts.first().copied().unwrap_or(0),
                    parts.get(1).copied().unwrap_or(0),
                    parts.get(2).copied().unwrap_or(0),
                );
                2 * (23 + name + encoding + data) - 5
            }
            SizedObject::Channel => {
                let (topic, encoding, metadata_kv) = (
                    parts.first().copied().unwrap_or(0),
                    parts.get(1).copied().unwrap_or(0),
                    parts.get(2).copied().unwrap_or(0),
                );
                2 * (25 + 10 + 10 + topic + encoding + metadata_kv)
            }
            SizedObject::Attachment => {
                let payload_len = parts.first().copied().unwrap_or(0);
                58 + 70 + payload_len
            }
            SizedObject::Metadata => {
                let (name, metadata_kv) = (
                    parts.first().copied().unwrap_or(0),
                    parts.get(1).copied().unwrap_or(0),
                );
                17 + 29 + name + metadata_kv + name
            }
        }
    }

    /// Encodes the byte length of a string-keyed/valued metadata map the way
    /// MCAP accounts for it: 4 bytes length prefix plus 4+len for every key
    /// and value.
    pub fn kv_size(metadata: &HashMap<String, String>) -> u64 {
        metadata
            .iter()
            .map(|(k, v)| 4 + k.len() as u64 + 4 + v.len() as u64)
            .sum()
    }

    /// Reserves space for a record before it is encoded. Fails with
    /// [`SizeTrackerError::FullFile`] without mutating state on failure.
    pub fn check_and_increase(
        &mut self,
        kind: SizedObject,
        encoded: u64,
    ) -> Result<(), SizeTrackerError> {
        if self.potential_size + encoded > self.space_available {
            self.disk_full = true;
            return Err(SizeTrackerError::FullFile { required: encoded });
        }

        self.potential_size += encoded;
        if matches!(
            kind,
            SizedObject::Schema
                | SizedObject::Channel
                | SizedObject::Attachment
                | SizedObject::Metadata
        ) {
            self.min_size += encoded;
        }

        Ok(())
    }

    /// Marks `encoded` bytes as actually written. Never fails; an overrun
    /// here indicates an estimation bug upstream and is only logged.
    pub fn mark_written(&mut self, encoded: u64) {
        self.written_size += encoded;
        if self.written_size > self.potential_size {
            tracing::warn!(
                written = self.written_size,
                potential = self.potential_size,
                "size tracker: written size exceeds potential size, estimation bug"
            );
        }
    }

    /// Atomically releases `old` bytes and reserves `new` -- used for the
    /// dynamic-types attachment, which is rewritten in place as it grows.
    pub fn replace_reservation(
        &mut self,
        old: u64,
        new: u64,
    ) -> Result<(), SizeTrackerError> {
        let relieved = self.potential_size.saturating_sub(old);
        if relieved + new > self.space_available {
            self.disk_full = true;
            return Err(SizeTrackerError::FullFile { required: new });
        }
        self.potential_size = relieved + new;
        self.min_size = self.min_size.saturating_sub(old) + new;
        Ok(())
    }

    /// Disables the tracker, asserting nothing was over-committed.
    pub fn reset(&mut self) {
        debug_assert!(self.written_size <= self.potential_size);
        self.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_starts_at_file_overhead() {
        let mut t = SizeTracker::new();
        t.init(1_000_000, 0);
        assert_eq!(t.potential_size(), FILE_OVERHEAD);
        assert_eq!(t.min_size(), FILE_OVERHEAD);
        assert!(t.enabled());
    }

    #[test]
    fn message_formula_matches_contract() {
        let size = SizeTracker::encoded_size(SizedObject::Message, &[4]);
        assert_eq!(size, 31 + 8 + 8 + 4);
    }

    #[test]
    fn schema_formula_matches_contract() {
        let size = SizeTracker::encoded_size(SizedObject::Schema, &[3, 7, 10]);
        assert_eq!(size, 2 * (23 + 3 + 7 + 10) - 5);
    }

    #[test]
    fn check_and_increase_rejects_overflow() {
        let mut t = SizeTracker::new();
        t.init(FILE_OVERHEAD + 10, 0);
        let err = t
            .check_and_increase(SizedObject::Message, 100)
            .unwrap_err();
        assert!(matches!(err, SizeTrackerError::FullFile { required: 100 }));
        assert!(t.disk_full());
    }

    #[test]
    fn check_and_increase_accepts_within_budget() {
        let mut t = SizeTracker::new();
        t.init(FILE_OVERHEAD + 100, 0);
        t.check_and_increase(SizedObject::Message, 50).unwrap();
        assert_eq!(t.potential_size(), FILE_OVERHEAD + 50);
        assert!(!t.disk_full());
    }

    #[test]
    fn replace_reservation_adjusts_min_size() {
        let mut t = SizeTracker::new();
        t.init(FILE_OVERHEAD + 1000, 0);
        t.check_and_increase(SizedObject::Attachment, 100).unwrap();
        assert_eq!(t.min_size(), FILE_OVERHEAD + 100);
        t.replace_reservation(100, 150).unwrap();
        assert_eq!(t.min_size(), FILE_OVERHEAD + 150);
        assert_eq!(t.potential_size(), FILE_OVERHEAD + 150);
    }
}
