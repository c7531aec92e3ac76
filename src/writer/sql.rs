// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite output writer.
//!
//! Creates `Types`, `Topics` and `Messages` tables on first use. Unlike the
//! MCAP writer, byte accounting for rotation purposes is approximate: the
//! writer periodically re-reads the on-disk file size (WAL makes
//! `written_size` only a lower bound) and, when full and rotation is
//! enabled, evicts the oldest rows from `Messages` (ordered by
//! `publish_time`) until enough bytes are freed, then `VACUUM`s.

use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::file_tracker::FileTracker;
use crate::size_tracker::{SizeTracker, SizedObject};
use crate::types::{Channel, DynamicTypesCollection, Message, Schema};

use super::{Writer, WriterError};

/// Re-reads the real on-disk file size after this many writes, since WAL
/// buffering makes the logical `written_size` an unreliable lower bound.
const RESYNC_INTERVAL: u64 = 64;

pub struct SqlWriter {
    file_tracker: Arc<FileTracker>,
    space_available: u64,
    size_tracker: SizeTracker,
    conn: Option<Connection>,
    current_path: String,
    schemas: Vec<Schema>,
    channels: Vec<Channel>,
    dynamic_types: DynamicTypesCollection,
    writes_since_resync: u64,
    rotation_enabled: bool,
    enabled: bool,
}

fn ns_to_iso8601(ns: u64) -> String {
    let secs = (ns / 1_000_000_000) as i64;
    let nanos = (ns % 1_000_000_000) as u32;
    let dt = DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or_default();
    dt.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

fn map_sqlite_err(e: rusqlite::Error) -> WriterError {
    WriterError::Sql(e.to_string())
}

impl SqlWriter {
    pub fn new(file_tracker: Arc<FileTracker>, space_available: u64, rotation_enabled: bool) -> Self {
        Self {
            file_tracker,
            space_available,
            size_tracker: SizeTracker::new(),
            conn: None,
            current_path: String::new(),
            schemas: Vec::new(),
            channels: Vec::new(),
            dynamic_types: DynamicTypesCollection::default(),
            writes_since_resync: 0,
            rotation_enabled,
            enabled: false,
        }
    }

    fn open_new_file(&mut self, min_size: u64) -> Result<(), WriterError> {
        let _name = self.file_tracker.new_file(min_size)?;
        let tmp_name = self.file_tracker.current_filename();

        let conn = Connection::open(&tmp_name).map_err(map_sqlite_err)?;
        conn.execute_batch(
            "CREATE TABLE Types (
                name TEXT PRIMARY KEY,
                information TEXT NOT NULL,
                object TEXT NOT NULL,
                is_ros2_type INTEGER NOT NULL
            );
            CREATE TABLE Topics (
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                qos TEXT NOT NULL,
                is_ros2_topic INTEGER NOT NULL,
                PRIMARY KEY (name, type),
                FOREIGN KEY (type) REFERENCES Types(name)
            );
            CREATE TABLE Messages (
                writer_guid TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                data BLOB NOT NULL,
                data_size INTEGER NOT NULL,
                topic TEXT NOT NULL,
                type TEXT NOT NULL,
                key TEXT,
                log_time TEXT NOT NULL,
                publish_time TEXT NOT NULL,
                PRIMARY KEY (writer_guid, sequence_number),
                FOREIGN KEY (topic, type) REFERENCES Topics(name, type)
            );
            CREATE TABLE Partitions (
                topic TEXT NOT NULL,
                type TEXT NOT NULL,
                partition TEXT NOT NULL
            );",
        )
        .map_err(map_sqlite_err)?;

        self.current_path = tmp_name;
        self.size_tracker.init(self.space_available, min_size);

        let schemas = self.schemas.clone();
        let channels = self.channels.clone();
        for schema in &schemas {
            insert_type_row(&conn, schema)?;
        }
        for channel in &channels {
            insert_topic_row(&conn, channel, &schemas)?;
        }

        self.conn = Some(conn);
        Ok(())
    }

    fn close_current_file(&mut self) -> Result<(), WriterError> {
        if let Some(conn) = self.conn.take() {
            write_types_snapshot(&conn, &self.dynamic_types)?;
            conn.execute_batch("VACUUM;").map_err(map_sqlite_err)?;
            drop(conn);
            let size = fs::metadata(&self.current_path).map(|m| m.len()).unwrap_or(0);
            self.file_tracker.set_current_file_size(size);
            self.file_tracker.close_file()?;
        }
        Ok(())
    }

    fn resync_size(&mut self) -> Result<(), WriterError> {
        self.writes_since_resync += 1;
        if self.writes_since_resync < RESYNC_INTERVAL {
            return Ok(());
        }
        self.writes_since_resync = 0;

        let real_size = fs::metadata(&self.current_path).map(|m| m.len()).unwrap_or(0);
        if real_size <= self.size_tracker.written_size() {
            return Ok(());
        }

        if !self.rotation_enabled {
            return Ok(());
        }

        let over = real_size.saturating_sub(self.size_tracker.potential_size());
        if over == 0 {
            return Ok(());
        }

        self.evict_oldest_rows(over)?;
        Ok(())
    }

    /// Closes the current file and opens a fresh one sized for `encoded`
    /// additional bytes. If the file tracker cannot make room (rotation
    /// disabled or nothing left to evict), disables the writer and surfaces
    /// [`WriterError::DiskFull`] instead of the raw file-tracker error.
    fn reopen_for(&mut self, encoded: u64) -> Result<(), WriterError> {
        let min_size = self.size_tracker.min_size() + encoded;
        self.close_current_file()?;
        match self.open_new_file(min_size) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.enabled = false;
                Err(WriterError::DiskFull)
            }
        }
    }

    fn evict_oldest_rows(&mut self, bytes_to_free: u64) -> Result<(), WriterError> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(());
        };

        let mut freed = 0u64;
        loop {
            if freed >= bytes_to_free {
                break;
            }
            let row: Option<(String, i64, i64)> = conn
                .query_row(
                    "SELECT writer_guid, sequence_number, data_size FROM Messages ORDER BY publish_time ASC LIMIT 1",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .ok();

            let Some((guid, seq, data_size)) = row else {
                tracing::warn!("no more rows to evict while freeing space");
                break;
            };

            conn.execute(
                "DELETE FROM Messages WHERE writer_guid = ?1 AND sequence_number = ?2",
                params![guid, seq],
            )
            .map_err(map_sqlite_err)?;

            freed += data_size as u64;
        }

        conn.execute_batch("VACUUM;").map_err(map_sqlite_err)?;
        tracing::info!(freed, "evicted oldest rows to enforce rotation budget");
        Ok(())
    }
}

fn insert_type_row(conn: &Connection, schema: &Schema) -> Result<(), WriterError> {
    conn.execute(
        "INSERT OR REPLACE INTO Types (name, information, object, is_ros2_type) VALUES (?1, ?2, ?3, ?4)",
        params![
            schema.name,
            schema.data,
            "",
            matches!(schema.encoding, crate::types::SchemaEncoding::Ros2Msg),
        ],
    )
    .map_err(map_sqlite_err)?;
    Ok(())
}

fn insert_topic_row(conn: &Connection, channel: &Channel, schemas: &[Schema]) -> Result<(), WriterError> {
    let type_name = schemas
        .iter()
        .find(|s| s.id == channel.schema_id)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "unknown".to_string());

    conn.execute(
        "INSERT OR REPLACE INTO Topics (name, type, qos, is_ros2_topic) VALUES (?1, ?2, ?3, ?4)",
        params![
            channel.topic_name,
            type_name,
            channel.qos.encode(),
            channel.ros2_types,
        ],
    )
    .map_err(map_sqlite_err)?;
    Ok(())
}

fn write_types_snapshot(conn: &Connection, collection: &DynamicTypesCollection) -> Result<(), WriterError> {
    for entry in &collection.entries {
        conn.execute(
            "UPDATE Types SET information = ?2, object = ?3 WHERE name = ?1",
            params![entry.type_name, entry.type_information, entry.type_object],
        )
        .map_err(map_sqlite_err)?;
    }
    Ok(())
}

impl Writer for SqlWriter {
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
        let encoded = 32 + schema.name.len() as u64 + schema.data.len() as u64;
        if self.size_tracker.check_and_increase(SizedObject::Schema, encoded).is_err() {
            self.reopen_for(encoded)?;
        }

        if let Some(existing) = self.schemas.iter_mut().find(|s| s.id == schema.id) {
            *existing = schema.clone();
        } else {
            self.schemas.push(schema.clone());
        }

        if let Some(conn) = self.conn.as_ref() {
            insert_type_row(conn, schema)?;
        }
        self.size_tracker.mark_written(encoded);
        Ok(())
    }

    fn write_channel(&mut self, channel: &Channel) -> Result<(), WriterError> {
        let encoded = 16
            + channel.topic_name.len() as u64
            + SizeTracker::kv_size(&channel.metadata());

        if self.size_tracker.check_and_increase(SizedObject::Channel, encoded).is_err() {
            self.reopen_for(encoded)?;
        }

        if let Some(existing) = self.channels.iter_mut().find(|c| c.id == channel.id) {
            *existing = channel.clone();
        } else {
            self.channels.push(channel.clone());
        }

        let schemas = self.schemas.clone();
        if let Some(conn) = self.conn.as_ref() {
            insert_topic_row(conn, channel, &schemas)?;
        }
        self.size_tracker.mark_written(encoded);
        Ok(())
    }

    fn write_message(&mut self, message: &Message) -> Result<(), WriterError> {
        let encoded = 48 + message.data_size();

        if self.size_tracker.check_and_increase(SizedObject::Message, encoded).is_err() {
            if !self.rotation_enabled {
                self.enabled = false;
                return Err(WriterError::DiskFull);
            }
            self.reopen_for(encoded)?;
        }

        let channel = self
            .channels
            .iter()
            .find(|c| c.id == message.channel_id)
            .ok_or_else(|| WriterError::Inconsistency("write_message before write_channel".into()))?;
        let type_name = self
            .schemas
            .iter()
            .find(|s| s.id == channel.schema_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let conn = self.conn.as_ref().ok_or(WriterError::DiskFull)?;
        conn.execute(
            "INSERT INTO Messages (writer_guid, sequence_number, data, data_size, topic, type, key, log_time, publish_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8)",
            params![
                hex_guid(&message.source_guid),
                message.sequence as i64,
                message.payload.to_vec(),
                message.data_size() as i64,
                channel.topic_name,
                type_name,
                ns_to_iso8601(message.log_time_ns),
                ns_to_iso8601(message.publish_time_ns),
            ],
        )
        .map_err(map_sqlite_err)?;

        self.size_tracker.mark_written(encoded);
        self.resync_size()?;
        Ok(())
    }

    fn update_dynamic_types(&mut self, collection: &DynamicTypesCollection) -> Result<(), WriterError> {
        self.dynamic_types = collection.clone();
        if let Some(conn) = self.conn.as_ref() {
            write_types_snapshot(conn, collection)?;
        }
        Ok(())
    }
}

fn hex_guid(guid: &[u8; 16]) -> String {
    guid.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Durability, Ownership, Reliability, SchemaEncoding, TopicQoS};
    use std::sync::Arc as StdArc;
    use tempfile::tempdir;

    fn make_tracker(dir: &std::path::Path) -> Arc<FileTracker> {
        Arc::new(FileTracker::new(crate::file_tracker::FileTrackerConfig {
            directory: dir.to_path_buf(),
            filename_stem: "rec".to_string(),
            extension: ".db".to_string(),
            max_file_size: 1_000_000,
            max_total_size: 10_000_000,
            prepend_timestamp: false,
            rotation_enabled: false,
        }))
    }

    #[test]
    fn write_schema_channel_message_creates_rows() {
        let dir = tempdir().unwrap();
        let tracker = make_tracker(dir.path());
        let mut w = SqlWriter::new(tracker, 1_000_000, false);
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
            source_guid: [2; 16],
            payload: StdArc::from(vec![0xAB].into_boxed_slice()),
        })
        .unwrap();

        w.disable().unwrap();

        let path = dir.path().join("rec.db");
        let conn = Connection::open(path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM Messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
