// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reads a recorded SQLite database back into [`super::RecordedMessage`]s.

use std::path::Path;

use chrono::DateTime;
use rusqlite::Connection;

use crate::glue::DdsTopic;
use crate::types::{DynamicTypeEntry, DynamicTypesCollection};

use super::{RecordedMessage, ReplayError, ReplaySource};

pub struct SqlReplaySource {
    conn: Connection,
}

fn map_err(e: rusqlite::Error) -> ReplayError {
    ReplayError::Sql(e.to_string())
}

fn iso8601_to_ns(text: &str) -> Result<u64, ReplayError> {
    let dt = DateTime::parse_from_rfc3339(text)
        .map_err(|e| ReplayError::Inconsistency(format!("bad timestamp {text}: {e}")))?;
    let secs = dt.timestamp();
    let nanos = dt.timestamp_subsec_nanos();
    Ok(secs as u64 * 1_000_000_000 + nanos as u64)
}

impl SqlReplaySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let conn = Connection::open(path).map_err(map_err)?;
        Ok(Self { conn })
    }
}

impl ReplaySource for SqlReplaySource {
    fn topics(&self) -> Vec<DdsTopic> {
        let mut stmt = match self.conn.prepare("SELECT name, type FROM Topics") {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        stmt.query_map([], |row| {
            Ok(DdsTopic { topic_name: row.get(0)?, type_name: row.get(1)? })
        })
        .map(|rows| rows.filter_map(Result::ok).collect())
        .unwrap_or_default()
    }

    fn dynamic_types(&self) -> DynamicTypesCollection {
        let mut collection = DynamicTypesCollection::default();
        let mut stmt = match self
            .conn
            .prepare("SELECT name, information, object FROM Types")
        {
            Ok(s) => s,
            Err(_) => return collection,
        };
        let rows = stmt.query_map([], |row| {
            Ok(DynamicTypeEntry {
                type_name: row.get(0)?,
                type_information: row.get(1)?,
                type_object: row.get(2)?,
            })
        });
        if let Ok(rows) = rows {
            for entry in rows.filter_map(Result::ok) {
                collection.insert(entry);
            }
        }
        collection
    }

    fn messages(&mut self) -> Result<Vec<RecordedMessage>, ReplayError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT topic, type, data, log_time, publish_time FROM Messages ORDER BY publish_time ASC",
            )
            .map_err(map_err)?;

        let rows = stmt
            .query_map([], |row| {
                let topic_name: String = row.get(0)?;
                let type_name: String = row.get(1)?;
                let data: Vec<u8> = row.get(2)?;
                let log_time: String = row.get(3)?;
                let publish_time: String = row.get(4)?;
                Ok((topic_name, type_name, data, log_time, publish_time))
            })
            .map_err(map_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (topic_name, type_name, data, log_time, publish_time) = row.map_err(map_err)?;
            out.push(RecordedMessage {
                topic: DdsTopic { topic_name, type_name },
                log_time_ns: iso8601_to_ns(&log_time)?,
                publish_time_ns: iso8601_to_ns(&publish_time)?,
                payload: data,
            });
        }
        Ok(out)
    }
}
