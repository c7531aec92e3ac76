// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! dds-record - Capture DDS samples to MCAP and/or SQLite.
//!
//! Usage:
//!   dds-record --config-path recorder.json
//!   dds-record --config-path recorder.json --self-test

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dds_recorder::config::load_recorder_config;
use dds_recorder::glue::{ChannelDdsSource, DdsTopic, DiscoveredType, IncomingSample, RtpsPayloadData};
use dds_recorder::recorder::{Recorder, RecorderConfig};
use dds_recorder::types::{SchemaEncoding, TopicQoS};
use tracing::{error, info};

const EXIT_SUCCESS: i32 = 0;
const EXIT_BAD_ARGUMENT: i32 = 1;
const EXIT_BAD_CONFIG: i32 = 2;
const EXIT_MISSING_ARGUMENT: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "dds-record")]
#[command(about = "Capture DDS samples to MCAP and/or SQLite")]
#[command(version)]
struct Args {
    /// JSON recorder configuration file
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

    /// Feed a handful of synthetic samples through the loopback DDS source
    /// instead of waiting on a real participant (none is wired into this
    /// binary; see `dds_recorder::glue::DdsSource`).
    #[arg(long = "self-test")]
    self_test: bool,
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

    let Some(config_path) = args.config_path else {
        eprintln!("--config-path is required");
        return EXIT_MISSING_ARGUMENT;
    };

    let config = match load_recorder_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return EXIT_BAD_CONFIG;
        }
    };

    if args.reload_time > 0 {
        spawn_reload_watcher(config_path.clone(), args.reload_time);
    }

    let (source, handle) = ChannelDdsSource::new();
    let mut recorder = match Recorder::new(config, source) {
        Ok(recorder) => recorder,
        Err(e) => {
            error!(error = %e, "failed to construct recorder");
            return EXIT_BAD_CONFIG;
        }
    };

    info!("dds-record v{}", env!("CARGO_PKG_VERSION"));
    info!(directory = %recorder.config().output_directory.display(), "starting recording");

    if let Err(e) = recorder.start() {
        error!(error = %e, "failed to start recorder");
        return EXIT_BAD_CONFIG;
    }

    if args.self_test {
        run_self_test(&handle);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        error!(error = %e, "failed to install signal handler");
    }

    info!("recording started, press Ctrl+C to stop");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    if let Err(e) = recorder.stop() {
        error!(error = %e, "failed to stop recorder cleanly");
        return EXIT_BAD_CONFIG;
    }

    let stats = recorder.stats();
    info!(disk_full_events = stats.disk_full_events, "recording stopped");
    EXIT_SUCCESS
}

fn spawn_reload_watcher(path: PathBuf, interval_secs: u64) {
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(interval_secs));
        match load_recorder_config(&path) {
            Ok(_) => info!(path = %path.display(), "configuration file re-read"),
            Err(e) => error!(path = %path.display(), error = %e, "configuration reload failed"),
        }
    });
}

/// Publishes a short, self-contained sample sequence through the loopback
/// source so the recorder pipeline can be exercised without a real DDS
/// participant.
fn run_self_test(handle: &dds_recorder::glue::ChannelDdsSourceHandle) {
    let topic = DdsTopic { topic_name: "/self_test".to_string(), type_name: "SelfTest".to_string() };

    let _ = handle.schemas.send(DiscoveredType {
        type_name: topic.type_name.clone(),
        encoding: SchemaEncoding::Ros2Msg,
        schema_text: "string data".to_string(),
        type_information: String::new(),
        type_object: String::new(),
    });

    for i in 0..5u64 {
        let _ = handle.samples.send(IncomingSample {
            topic: topic.clone(),
            qos: TopicQoS::default(),
            data: RtpsPayloadData {
                payload: Arc::from(vec![i as u8].into_boxed_slice()),
                source_guid: [0; 16],
                source_timestamp_ns: i * 1_000_000,
            },
        });
    }
}
