// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Replay-side scheduler: re-emits recorded samples at wall-clock-relative
//! times, scaled by an optional rate.

pub mod mcap_reader;
pub mod sql_reader;

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::glue::{DdsSink, DdsTopic, GlueError};
use crate::types::DynamicTypesCollection;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mcap error: {0}")]
    Mcap(String),

    #[error("sql error: {0}")]
    Sql(String),

    #[error(transparent)]
    Glue(#[from] GlueError),

    #[error("malformed recording: {0}")]
    Inconsistency(String),
}

/// One recorded sample as read back from either container format.
#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub topic: DdsTopic,
    pub log_time_ns: u64,
    pub publish_time_ns: u64,
    pub payload: Vec<u8>,
}

/// A source of recorded messages, already in ascending `publish_time` order.
pub trait ReplaySource {
    fn topics(&self) -> Vec<DdsTopic>;
    fn dynamic_types(&self) -> DynamicTypesCollection;
    fn messages(&mut self) -> Result<Vec<RecordedMessage>, ReplayError>;
}

#[derive(Debug, Clone)]
pub struct ReplayerConfig {
    /// Replay speed multiplier; 1.0 is realtime.
    pub rate: f64,
    /// Wall-clock time the first message should target; `None` means "now".
    pub start_replay_time: Option<SystemTime>,
    pub topic_filter: Option<HashSet<String>>,
}

impl Default for ReplayerConfig {
    fn default() -> Self {
        Self { rate: 1.0, start_replay_time: None, topic_filter: None }
    }
}

struct Cancel {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl Cancel {
    fn new() -> Arc<Self> {
        Arc::new(Self { stopped: Mutex::new(false), cv: Condvar::new() })
    }

    fn stop(&self) {
        *self.stopped.lock().unwrap() = true;
        self.cv.notify_all();
    }

    /// Sleeps until `target` or until cancelled, whichever comes first.
    /// Returns `false` if cancelled.
    fn sleep_until(&self, target: SystemTime) -> bool {
        loop {
            let now = SystemTime::now();
            if now >= target {
                return !*self.stopped.lock().unwrap();
            }
            let remaining = target.duration_since(now).unwrap_or(Duration::ZERO);
            let guard = self.stopped.lock().unwrap();
            if *guard {
                return false;
            }
            let (guard, timed_out) = self.cv.wait_timeout(guard, remaining).unwrap();
            if *guard {
                return false;
            }
            if timed_out.timed_out() {
                return true;
            }
        }
    }
}

pub struct Replayer<K: DdsSink> {
    config: ReplayerConfig,
    sink: K,
    cancel: Arc<Cancel>,
}

impl<K: DdsSink> Replayer<K> {
    pub fn new(config: ReplayerConfig, sink: K) -> Self {
        Self { config, sink, cancel: Cancel::new() }
    }

    pub fn stop_handle(&self) -> Arc<dyn Fn() + Send + Sync>
    where
        K: 'static,
    {
        let cancel = Arc::clone(&self.cancel);
        Arc::new(move || cancel.stop())
    }

    /// Streams `messages` (already ascending by publish_time) at
    /// wall-clock-relative pacing. Unknown topics are logged and skipped.
    pub fn run(
        &mut self,
        messages: Vec<RecordedMessage>,
        known_topics: &HashSet<String>,
    ) -> Result<(), ReplayError> {
        let Some(first) = messages.first() else { return Ok(()) };
        let t0 = first.log_time_ns;

        let now = SystemTime::now();
        let start = match self.config.start_replay_time {
            Some(t) if t > now => t,
            Some(_) => {
                tracing::warn!("start_replay_time is in the past, replaying from now");
                now
            }
            None => now,
        };

        for message in messages {
            if let Some(filter) = &self.config.topic_filter {
                if !filter.contains(&message.topic.topic_name) {
                    continue;
                }
            }
            if !known_topics.contains(&message.topic.topic_name) {
                tracing::warn!(topic = %message.topic.topic_name, "unknown topic during replay, skipping");
                continue;
            }

            let delta_ns = message.log_time_ns.saturating_sub(t0);
            let scaled = Duration::from_nanos((delta_ns as f64 / self.config.rate) as u64);
            let target = start + scaled;

            if !self.cancel.sleep_until(target) {
                tracing::info!("replay cancelled");
                return Ok(());
            }

            self.sink.ensure_writer(&message.topic)?;
            let emitted_ns = target
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64;
            self.sink.publish(&message.topic, &message.payload, emitted_ns)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glue::ChannelDdsSink;

    #[test]
    fn replay_emits_in_order_and_skips_unknown_topics() {
        let (sink, rx) = ChannelDdsSink::new();
        let mut replayer = Replayer::new(
            ReplayerConfig { rate: 1000.0, ..ReplayerConfig::default() },
            sink,
        );

        let known_topic = DdsTopic { topic_name: "/known".to_string(), type_name: "T".to_string() };
        let unknown_topic = DdsTopic { topic_name: "/unknown".to_string(), type_name: "T".to_string() };

        let messages = vec![
            RecordedMessage { topic: known_topic.clone(), log_time_ns: 0, publish_time_ns: 0, payload: vec![1] },
            RecordedMessage { topic: unknown_topic, log_time_ns: 1_000, publish_time_ns: 1_000, payload: vec![2] },
            RecordedMessage { topic: known_topic.clone(), log_time_ns: 2_000, publish_time_ns: 2_000, payload: vec![3] },
        ];

        let mut known = HashSet::new();
        known.insert("/known".to_string());

        replayer.run(messages, &known).unwrap();

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].1, vec![1]);
        assert_eq!(received[1].1, vec![3]);
    }

    /// Emission wall-clock must land within `[T0 + delta/rate, T0 + delta/rate + eps]`.
    #[test]
    fn replay_paces_emission_within_epsilon_of_target() {
        let (sink, rx) = ChannelDdsSink::new();
        let mut replayer = Replayer::new(ReplayerConfig { rate: 2.0, ..ReplayerConfig::default() }, sink);

        let topic = DdsTopic { topic_name: "/paced".to_string(), type_name: "T".to_string() };
        let messages = vec![
            RecordedMessage { topic: topic.clone(), log_time_ns: 0, publish_time_ns: 0, payload: vec![1] },
            RecordedMessage { topic: topic.clone(), log_time_ns: 200_000_000, publish_time_ns: 0, payload: vec![2] },
        ];
        let mut known = HashSet::new();
        known.insert("/paced".to_string());

        let t0_wall = SystemTime::now();
        replayer.run(messages, &known).unwrap();

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);

        // At rate=2.0, the second message (200ms of log time later) should
        // be emitted ~100ms after the first.
        let epsilon = Duration::from_millis(50);
        let elapsed = SystemTime::now().duration_since(t0_wall).unwrap_or_default();
        let expected = Duration::from_millis(100);
        assert!(
            elapsed >= expected && elapsed <= expected + epsilon,
            "elapsed {elapsed:?} outside [{expected:?}, {:?}]",
            expected + epsilon
        );
    }
}
