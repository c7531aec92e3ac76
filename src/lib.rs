// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS Recording Service
//!
//! Records DDS samples to MCAP and/or SQLite, and replays them back onto a
//! DDS domain with wall-clock fidelity.
//!
//! # Quick Start
//!
//! ```bash
//! # Record all topics on domain 0 to MCAP
//! dds-record --config-path recorder.json
//!
//! # Replay at 2x speed
//! dds-replay --config-path replayer.json --input capture.mcap
//! ```
//!
//! # Format Comparison
//!
//! | Feature | MCAP | SQLite |
//! |---------|------|--------|
//! | Self-contained | [OK] | [OK] |
//! | Foxglove compatible | [OK] | [X] |
//! | Queryable with SQL | [X] | [OK] |

pub mod config;
pub mod file_tracker;
pub mod filter;
pub mod glue;
pub mod handler;
pub mod handler_context;
pub mod monitor;
pub mod recorder;
pub mod replayer;
pub mod serializer;
pub mod size_tracker;
pub mod types;
pub mod writer;

pub use config::{ConfigError, ReplayConfigFile};
pub use filter::{TopicFilter, TypeFilter};
pub use handler::{BaseHandler, HandlerConfig, HandlerError, HandlerState};
pub use handler_context::{HandlerContextCollection, HandlerContextError};
pub use recorder::{Recorder, RecorderConfig, RecorderError, RecordingStats};
pub use replayer::{RecordedMessage, ReplayError, Replayer, ReplayerConfig, ReplaySource};
