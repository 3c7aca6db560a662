//! # Runtime Configuration
//!
//! Process-level settings around the core [`SequencerConfig`].
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. JSON file named by `SEQ_CONFIG`
//! 3. `SEQ_*` environment variables

use sequencer_core::duration_serde::{self, parse_duration};
use sequencer_core::{ConfigurationError, SequencerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an optional JSON configuration file.
pub const CONFIG_PATH_VAR: &str = "SEQ_CONFIG";

#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("Failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error(transparent)]
    Sequencer(#[from] ConfigurationError),
}

/// Complete runtime configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub sequencer: SequencerConfig,
    /// Sequence definition document (JSON).
    pub sequence_document: PathBuf,
    /// Period of the expired and closed purges.
    #[serde(with = "duration_serde")]
    pub housekeeping_interval: Duration,
    /// Period of the pending-action jobs.
    #[serde(with = "duration_serde")]
    pub override_interval: Duration,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sequencer: SequencerConfig::default(),
            sequence_document: PathBuf::from("./sequences.json"),
            housekeeping_interval: Duration::from_secs(60),
            override_interval: Duration::from_secs(5),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_path(path: &Path) -> Result<Self, RuntimeConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuntimeConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| RuntimeConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the process environment.
    pub fn load() -> Result<Self, RuntimeConfigError> {
        Self::load_with(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn load_with<F>(lookup: F) -> Result<Self, RuntimeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_path(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SEQ_*` overrides.
    pub fn apply_env<F>(&mut self, lookup: &F) -> Result<(), RuntimeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SEQ_SEQUENCE_DOCUMENT") {
            self.sequence_document = PathBuf::from(path);
        }
        if let Some(level) = lookup("SEQ_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(value) = lookup("SEQ_JSON_LOGS") {
            self.json_logs = parse_env("SEQ_JSON_LOGS", &value, |v| v.parse::<bool>())?;
        }
        if let Some(value) = lookup("SEQ_HOUSEKEEPING_INTERVAL") {
            self.housekeeping_interval =
                parse_env("SEQ_HOUSEKEEPING_INTERVAL", &value, parse_duration)?;
        }
        if let Some(value) = lookup("SEQ_OVERRIDE_INTERVAL") {
            self.override_interval = parse_env("SEQ_OVERRIDE_INTERVAL", &value, parse_duration)?;
        }
        if let Some(value) = lookup("SEQ_LOCK_IDLE_TIMEOUT") {
            self.sequencer.lock_idle_timeout =
                parse_env("SEQ_LOCK_IDLE_TIMEOUT", &value, parse_duration)?;
        }
        if let Some(value) = lookup("SEQ_RECORDING_CUTOVER") {
            let cutover = parse_env("SEQ_RECORDING_CUTOVER", &value, |v| {
                chrono::DateTime::parse_from_rfc3339(v)
            })?;
            self.sequencer.recording_cutover = Some(cutover.with_timezone(&chrono::Utc));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RuntimeConfigError> {
        self.sequencer.validate()?;
        if self.housekeeping_interval.is_zero() {
            return Err(ConfigurationError::InvalidSetting(
                "housekeeping_interval cannot be 0".into(),
            )
            .into());
        }
        if self.override_interval.is_zero() {
            return Err(ConfigurationError::InvalidSetting(
                "override_interval cannot be 0".into(),
            )
            .into());
        }
        Ok(())
    }
}

fn parse_env<T, E, P>(var: &'static str, value: &str, parse: P) -> Result<T, RuntimeConfigError>
where
    P: FnOnce(&str) -> Result<T, E>,
    E: std::fmt::Display,
{
    parse(value.trim()).map_err(|e| RuntimeConfigError::InvalidEnv {
        var,
        reason: e.to_string(),
    })
}
