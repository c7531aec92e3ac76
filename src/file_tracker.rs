// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output file naming, rotation and aggregate-size accounting.
//!
//! A [`FileTracker`] owns exactly one open file at a time, named
//! `<name>.tmp~` until [`FileTracker::close_file`] renames it. Rotation (when
//! enabled) deletes the oldest closed file to make room for a new one,
//! keeping the aggregate size under `max_total_size`.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileTrackerError {
    #[error("minimum file size {min_size} is greater than the maximum file size {max_file_size}")]
    FullDisk { min_size: u64, max_file_size: u64 },

    #[error("not enough free space for a new file: free={free}, required={required}")]
    NoSpace { free: u64, required: u64 },

    #[error("file {0} already exists")]
    AlreadyExists(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A closed (or currently open) output file.
#[derive(Debug, Clone, Default)]
pub struct FileRecord {
    pub id: u64,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct FileTrackerConfig {
    pub directory: PathBuf,
    pub filename_stem: String,
    pub extension: String,
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub prepend_timestamp: bool,
    pub rotation_enabled: bool,
}

struct Inner {
    current: FileRecord,
    closed: Vec<FileRecord>,
    aggregate_size: u64,
}

/// Names, opens, closes and rotates recorder output files.
pub struct FileTracker {
    config: FileTrackerConfig,
    inner: Mutex<Inner>,
}

const TMP_SUFFIX: &str = ".tmp~";

impl FileTracker {
    pub fn new(config: FileTrackerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                current: FileRecord::default(),
                closed: Vec::new(),
                aggregate_size: 0,
            }),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.inner.lock().unwrap().aggregate_size
    }

    pub fn closed_file_count(&self) -> usize {
        self.inner.lock().unwrap().closed.len()
    }

    /// Allocates the name for a new file large enough to hold `min_size`
    /// bytes, rotating out the oldest closed files if necessary.
    pub fn new_file(&self, min_size: u64) -> Result<String, FileTrackerError> {
        if min_size > self.config.max_file_size {
            return Err(FileTrackerError::FullDisk {
                min_size,
                max_file_size: self.config.max_file_size,
            });
        }

        let mut inner = self.inner.lock().unwrap();

        let free_space = self.config.max_total_size.saturating_sub(inner.aggregate_size);
        let mut space_to_free = min_size as i64 - free_space as i64;

        if space_to_free > 0 && !self.config.rotation_enabled {
            return Err(FileTrackerError::NoSpace {
                free: free_space,
                required: min_size,
            });
        }

        while space_to_free > 0 {
            if inner.closed.is_empty() {
                return Err(FileTrackerError::NoSpace {
                    free: free_space,
                    required: min_size,
                });
            }
            let oldest_size = remove_oldest_file(&mut inner);
            space_to_free -= oldest_size as i64;
        }

        let id = inner.closed.last().map(|f| f.id + 1).unwrap_or(0);
        let name = self.generate_filename(id);
        let tmp_name = make_tmp_name(&name);

        if fs::metadata(&name).is_ok() {
            return Err(FileTrackerError::AlreadyExists(name));
        }
        if fs::metadata(&tmp_name).is_ok() {
            return Err(FileTrackerError::AlreadyExists(tmp_name));
        }

        tracing::info!(id, min_size, "opening new output file");
        inner.current = FileRecord { id, name: name.clone(), size: 0 };
        Ok(name)
    }

    /// Path of the currently open file (with the `.tmp~` suffix).
    pub fn current_filename(&self) -> String {
        let inner = self.inner.lock().unwrap();
        make_tmp_name(&inner.current.name)
    }

    pub fn set_current_file_size(&self, size: u64) {
        let mut inner = self.inner.lock().unwrap();
        if size > self.config.max_file_size {
            tracing::warn!(size, max = self.config.max_file_size, "file size exceeds configured maximum");
        }
        inner.current.size = size;
    }

    /// Renames the current file from its temp name to its final name and
    /// folds it into the aggregate.
    pub fn close_file(&self) -> Result<(), FileTrackerError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.current.name.is_empty() {
            tracing::error!("no file to close");
            return Ok(());
        }
        if inner.current.size == 0 {
            tracing::error!(name = %inner.current.name, "closing an empty file");
        }

        let tmp = make_tmp_name(&inner.current.name);
        fs::rename(&tmp, &inner.current.name)?;

        tracing::info!(name = %inner.current.name, size = inner.current.size, "closed output file");

        inner.aggregate_size += inner.current.size;
        let current = std::mem::take(&mut inner.current);
        inner.closed.push(current);
        Ok(())
    }

    fn generate_filename(&self, id: u64) -> String {
        let mut name = self.config.directory.join("placeholder");
        name.pop();
        let mut filename = String::new();

        if self.config.prepend_timestamp {
            let ts = Utc::now().format("%Y%m%d_%H%M%S");
            filename.push_str(&ts.to_string());
            filename.push('_');
        }

        filename.push_str(&self.config.filename_stem);

        if self.config.max_total_size > self.config.max_file_size {
            filename.push('_');
            filename.push_str(&id.to_string());
        }

        filename.push_str(&self.config.extension);
        name.push(filename);
        name.to_string_lossy().into_owned()
    }
}

fn make_tmp_name(name: &str) -> String {
    format!("{name}{TMP_SUFFIX}")
}

fn remove_oldest_file(inner: &mut Inner) -> u64 {
    if inner.closed.is_empty() {
        return 0;
    }
    let oldest = inner.closed.remove(0);
    match fs::remove_file(&oldest.name) {
        Ok(()) => {
            tracing::info!(name = %oldest.name, size = oldest.size, "rotated out oldest file");
        }
        Err(e) => {
            tracing::error!(name = %oldest.name, error = %e, "failed to remove rotated file");
            return 0;
        }
    }
    inner.aggregate_size = inner.aggregate_size.saturating_sub(oldest.size);
    oldest.size
}

impl Drop for FileTracker {
    fn drop(&mut self) {
        let needs_close = {
            let inner = self.inner.lock().unwrap();
            !inner.current.name.is_empty() && inner.current.size > 0
        };
        if needs_close {
            let _ = self.close_file();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path, max_file: u64, max_total: u64, rotation: bool) -> FileTrackerConfig {
        FileTrackerConfig {
            directory: dir.to_path_buf(),
            filename_stem: "recording".to_string(),
            extension: ".mcap".to_string(),
            max_file_size: max_file,
            max_total_size: max_total,
            prepend_timestamp: false,
            rotation_enabled: rotation,
        }
    }

    #[test]
    fn new_file_then_close_tracks_aggregate() {
        let dir = tempdir().unwrap();
        let tracker = FileTracker::new(config(dir.path(), 4096, 8192, false));
        let name = tracker.new_file(0).unwrap();
        assert!(name.ends_with("recording.mcap"));
        fs::write(tracker.current_filename(), b"abc").unwrap();
        tracker.set_current_file_size(3);
        tracker.close_file().unwrap();
        assert_eq!(tracker.total_size(), 3);
        assert_eq!(tracker.closed_file_count(), 1);
    }

    #[test]
    fn rotation_deletes_oldest_when_needed() {
        let dir = tempdir().unwrap();
        let tracker = FileTracker::new(config(dir.path(), 10, 20, true));

        tracker.new_file(0).unwrap();
        fs::write(tracker.current_filename(), b"0123456789").unwrap();
        tracker.set_current_file_size(10);
        tracker.close_file().unwrap();

        tracker.new_file(0).unwrap();
        fs::write(tracker.current_filename(), b"0123456789").unwrap();
        tracker.set_current_file_size(10);
        tracker.close_file().unwrap();

        assert_eq!(tracker.total_size(), 20);

        // A third file needs 10 bytes but only 0 free; rotation must evict.
        tracker.new_file(10).unwrap();
        assert_eq!(tracker.closed_file_count(), 1);
    }

    #[test]
    fn no_rotation_fails_when_full() {
        let dir = tempdir().unwrap();
        let tracker = FileTracker::new(config(dir.path(), 10, 10, false));
        tracker.new_file(0).unwrap();
        fs::write(tracker.current_filename(), b"0123456789").unwrap();
        tracker.set_current_file_size(10);
        tracker.close_file().unwrap();

        let err = tracker.new_file(1).unwrap_err();
        assert!(matches!(err, FileTrackerError::NoSpace { .. }));
    }

    #[test]
    fn min_size_over_max_file_size_rejected() {
        let dir = tempdir().unwrap();
        let tracker = FileTracker::new(config(dir.path(), 10, 100, true));
        let err = tracker.new_file(20).unwrap_err();
        assert!(matches!(err, FileTrackerError::FullDisk { .. }));
    }
}
