// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loads `--config-path` JSON documents into [`crate::recorder::RecorderConfig`]
//! or [`ReplayConfigFile`], and validates them before they reach the
//! orchestrators. YAML parsing stays out of scope; JSON is the on-disk format.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recorder::RecorderConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("invalid JSON in {path}: {source}")]
    Json { path: String, source: serde_json::Error },

    #[error("configuration error: {0}")]
    Validation(String),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path_ref = path.as_ref();
    let text = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
        path: path_ref.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path_ref.display().to_string(),
        source,
    })
}

pub fn load_recorder_config(path: impl AsRef<Path>) -> Result<RecorderConfig, ConfigError> {
    let config: RecorderConfig = read_json(path)?;
    validate_recorder_config(&config)?;
    Ok(config)
}

pub fn validate_recorder_config(config: &RecorderConfig) -> Result<(), ConfigError> {
    if !config.enable_mcap && !config.enable_sql {
        return Err(ConfigError::Validation(
            "at least one of enable_mcap/enable_sql must be set".to_string(),
        ));
    }
    if config.max_file_size == 0 {
        return Err(ConfigError::Validation("max_file_size must be non-zero".to_string()));
    }
    if config.max_total_size < config.max_file_size {
        return Err(ConfigError::Validation(
            "max_total_size must be at least max_file_size".to_string(),
        ));
    }
    if config.filename_stem.is_empty() {
        return Err(ConfigError::Validation("filename_stem must not be empty".to_string()));
    }
    Ok(())
}

/// `--config-path` document for the replay binary. Kept separate from
/// [`crate::replayer::ReplayerConfig`] since the latter carries a runtime
/// `SystemTime`/`HashSet` that doesn't round-trip through JSON cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplayConfigFile {
    pub rate: Option<f64>,
    pub topics: Option<Vec<String>>,
    pub domain_id: Option<u32>,
}

pub fn load_replay_config(path: impl AsRef<Path>) -> Result<ReplayConfigFile, ConfigError> {
    read_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(json: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_and_validates_recorder_config() {
        let json = serde_json::to_string(&RecorderConfig::default()).unwrap();
        let f = write_temp(&json);
        let config = load_recorder_config(f.path()).unwrap();
        assert!(config.enable_mcap);
    }

    #[test]
    fn rejects_config_with_no_output_format() {
        let mut config = RecorderConfig::default();
        config.enable_mcap = false;
        config.enable_sql = false;
        let json = serde_json::to_string(&config).unwrap();
        let f = write_temp(&json);
        let err = load_recorder_config(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let f = write_temp("not json");
        let err = load_recorder_config(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn loads_replay_config_with_optional_fields() {
        let f = write_temp(r#"{"rate": 2.0}"#);
        let config = load_replay_config(f.path()).unwrap();
        assert_eq!(config.rate, Some(2.0));
        assert_eq!(config.topics, None);
    }
}
