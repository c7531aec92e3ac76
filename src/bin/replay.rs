// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! dds-replay - Replay a recorded MCAP or SQLite capture with wall-clock
//! fidelity.
//!
//! Usage:
//!   dds-replay --input capture.mcap
//!   dds-replay --config-path replayer.json --input capture.db

use std::collections::HashSet;
use std::path::PathBuf;

use clap::Parser;
use dds_recorder::config::load_replay_config;
use dds_recorder::glue::ChannelDdsSink;
use dds_recorder::replayer::mcap_reader::McapReplaySource;
use dds_recorder::replayer::sql_reader::SqlReplaySource;
use dds_recorder::replayer::{Replayer, ReplayerConfig, ReplaySource};
use tracing::{error, info};

const EXIT_SUCCESS: i32 = 0;
const EXIT_BAD_ARGUMENT: i32 = 1;
const EXIT_BAD_CONFIG: i32 = 2;
const EXIT_MISSING_ARGUMENT: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "dds-replay")]
#[command(about = "Replay a recorded MCAP or SQLite capture")]
#[command(version)]
struct Args {
    /// Recorded MCAP (.mcap) or SQLite (.db) file
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// JSON replayer configuration file
    #[arg(short = 'c', long = "config-path")]
    config_path: Option<PathBuf>,

    /// Reload the configuration file every N seconds (0 disables reload)
    #[arg(short = 'r', long = "reload-time", default_value = "0")]
    reload_time: u64,

    /// Enable debug-level logging
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Regex applied to `tracing` target names
    #[arg(long = "log-filter")]
    log_filter: Option<String>,

    /// Log verbosity
    #[arg(long = "log-verbosity", default_value = "info")]
    log_verbosity: String,
}

fn main() {
    let args = Args::parse();
    std::process::exit(run(args));
}

fn run(args: Args) -> i32 {
    let verbosity = if args.debug { "debug" } else { args.log_verbosity.as_str() };
    let level = match verbosity.parse::<tracing::Level>() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("invalid --log-verbosity: {verbosity}");
            return EXIT_BAD_ARGUMENT;
        }
    };
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);
    match &args.log_filter {
        Some(filter) => builder.with_env_filter(filter.clone()).init(),
        None => builder.init(),
    }

    let Some(input) = args.input else {
        eprintln!("--input is required");
        return EXIT_MISSING_ARGUMENT;
    };
    if !input.exists() {
        error!(path = %input.display(), "input file not found");
        return EXIT_BAD_ARGUMENT;
    }

    let config_file = match &args.config_path {
        Some(path) => match load_replay_config(path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "invalid configuration");
                return EXIT_BAD_CONFIG;
            }
        },
        None => Default::default(),
    };

    if args.reload_time > 0 {
        if let Some(path) = args.config_path.clone() {
            spawn_reload_watcher(path, args.reload_time);
        }
    }

    let replayer_config = ReplayerConfig {
        rate: config_file.rate.unwrap_or(1.0),
        start_replay_time: None,
        topic_filter: config_file.topics.map(|t| t.into_iter().collect::<HashSet<_>>()),
    };

    info!("dds-replay v{}", env!("CARGO_PKG_VERSION"));
    info!(path = %input.display(), rate = replayer_config.rate, "loading recording");

    let extension = input.extension().and_then(|e| e.to_str()).unwrap_or("");
    let (topics, dynamic_types, messages) = match extension {
        "mcap" => match McapReplaySource::open(&input) {
            Ok(mut source) => match source.messages() {
                Ok(messages) => (source.topics(), source.dynamic_types(), messages),
                Err(e) => {
                    error!(error = %e, "failed to read messages");
                    return EXIT_BAD_CONFIG;
                }
            },
            Err(e) => {
                error!(error = %e, "failed to open recording");
                return EXIT_BAD_CONFIG;
            }
        },
        "db" | "sqlite" | "sqlite3" => match SqlReplaySource::open(&input) {
            Ok(mut source) => match source.messages() {
                Ok(messages) => (source.topics(), source.dynamic_types(), messages),
                Err(e) => {
                    error!(error = %e, "failed to read messages");
                    return EXIT_BAD_CONFIG;
                }
            },
            Err(e) => {
                error!(error = %e, "failed to open recording");
                return EXIT_BAD_CONFIG;
            }
        },
        other => {
            error!(extension = other, "unrecognized input extension, expected .mcap or .db");
            return EXIT_BAD_ARGUMENT;
        }
    };

    info!(topics = topics.len(), types = dynamic_types.len(), messages = messages.len(), "recording loaded");

    let known_topics: HashSet<String> = topics.iter().map(|t| t.topic_name.clone()).collect();

    let (sink, published) = ChannelDdsSink::new();
    std::thread::spawn(move || {
        for (topic, payload, ts) in published {
            tracing::debug!(topic = %topic.topic_name, bytes = payload.len(), source_timestamp_ns = ts, "replayed sample");
        }
    });

    let mut replayer = Replayer::new(replayer_config, sink);
    let stop = replayer.stop_handle();

    if let Err(e) = ctrlc::set_handler(move || stop()) {
        error!(error = %e, "failed to install signal handler");
    }

    info!("replay starting, press Ctrl+C to stop");
    if let Err(e) = replayer.run(messages, &known_topics) {
        error!(error = %e, "replay failed");
        return EXIT_BAD_CONFIG;
    }

    info!("replay complete");
    EXIT_SUCCESS
}

fn spawn_reload_watcher(path: PathBuf, interval_secs: u64) {
    std::thread::spawn(move || loop {
        std::thread::sleep(std::time::Duration::from_secs(interval_secs));
        match load_replay_config(&path) {
            Ok(_) => info!(path = %path.display(), "configuration file re-read"),
            Err(e) => error!(path = %path.display(), error = %e, "configuration reload failed"),
        }
    });
}
