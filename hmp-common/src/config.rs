//! Configuration loading for the ingestion system
//!
//! Configuration is a single JSON document, located through a priority order:
//! 1. Command-line argument (highest priority)
//! 2. `HMP_IG_CONFIG` environment variable
//! 3. `./ingestion_config.json` (fallback)

use crate::phase::Phase;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "HMP_IG_CONFIG";

/// Fallback configuration path, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "ingestion_config.json";

/// Policy applied when a record arrives for an already-filled session slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Late record replaces the stored one (observed field behavior)
    #[default]
    Overwrite,
    /// First record wins; the late one is discarded
    Ignore,
    /// Late record is dropped and reported as an error
    Reject,
}

/// Ingestion system configuration, read once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Bind host for the inbound record endpoint
    #[serde(default = "default_host")]
    pub ingestion_host: String,
    /// Bind port for the inbound record endpoint
    pub ingestion_port: u16,

    /// `host:port` of the Preparation System (raw session consumer)
    pub preparation_address: String,
    /// `host:port` of the Evaluation System (label consumer)
    pub evaluation_address: String,

    /// Sessions with at least this many missing samples are dropped
    pub missing_samples_threshold_interval: usize,

    /// Initial-phase hint: true starts in evaluation, false in production
    #[serde(default)]
    pub evaluation_phase: bool,
    /// Explicit initial phase; overrides `evaluation_phase` when present
    #[serde(default)]
    pub initial_phase: Option<Phase>,

    /// Sessions to forward in production before switching to evaluation
    pub production_sessions: u64,
    /// Sessions to forward in evaluation before switching to production
    pub evaluation_sessions: u64,

    /// Service/testing escape hatch: true disables phase auto-advance
    #[serde(default)]
    pub service_flag: bool,

    /// Handling of duplicate records for an already-filled slot
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Partial sessions older than this are evicted; 0 disables eviction
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,

    /// Bound on each downstream send
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,

    /// Capacity of the transport-to-engine record channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_session_ttl() -> u64 {
    300
}

fn default_send_timeout() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    256
}

impl IngestionConfig {
    /// Bind address for the inbound server
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ingestion_host, self.ingestion_port)
    }

    /// Phase the engine starts in
    ///
    /// `initial_phase` wins when present; otherwise the `evaluation_phase`
    /// hint selects evaluation or production. Development is only ever
    /// entered by operator action, never implicitly.
    pub fn resolved_initial_phase(&self) -> Phase {
        match self.initial_phase {
            Some(phase) => phase,
            None if self.evaluation_phase => Phase::Evaluation,
            None => Phase::Production,
        }
    }

    /// Validate value ranges; called by [`load_config`]
    pub fn validate(&self) -> Result<()> {
        if self.ingestion_port == 0 {
            return Err(Error::Config("ingestion_port must be non-zero".into()));
        }
        if self.preparation_address.is_empty() || self.evaluation_address.is_empty() {
            return Err(Error::Config(
                "preparation_address and evaluation_address must be set".into(),
            ));
        }
        if self.missing_samples_threshold_interval == 0 {
            return Err(Error::Config(
                "missing_samples_threshold_interval must be at least 1".into(),
            ));
        }
        if self.production_sessions == 0 || self.evaluation_sessions == 0 {
            return Err(Error::Config(
                "production_sessions and evaluation_sessions must be at least 1".into(),
            ));
        }
        if self.send_timeout_seconds == 0 {
            return Err(Error::Config("send_timeout_seconds must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Resolve the configuration file path following the priority order
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    // Priority 1: command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }

    // Priority 3: working-directory fallback
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Load and validate configuration from a JSON file
pub fn load_config(path: &Path) -> Result<IngestionConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read config file {}: {}", path.display(), e))
    })?;
    let config: IngestionConfig = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
    config.validate()?;
    info!("configuration loaded from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_config_json() -> serde_json::Value {
        serde_json::json!({
            "ingestion_port": 5801,
            "preparation_address": "127.0.0.1:5802",
            "evaluation_address": "127.0.0.1:5803",
            "missing_samples_threshold_interval": 10,
            "production_sessions": 100,
            "evaluation_sessions": 50
        })
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_config_json()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.ingestion_host, "127.0.0.1");
        assert_eq!(config.bind_addr(), "127.0.0.1:5801");
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Overwrite);
        assert_eq!(config.session_ttl_seconds, 300);
        assert_eq!(config.resolved_initial_phase(), Phase::Production);
        assert!(!config.service_flag);
    }

    #[test]
    fn evaluation_phase_hint_and_override() {
        let mut value = minimal_config_json();
        value["evaluation_phase"] = serde_json::json!(true);
        let config: IngestionConfig = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(config.resolved_initial_phase(), Phase::Evaluation);

        value["initial_phase"] = serde_json::json!("development");
        let config: IngestionConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.resolved_initial_phase(), Phase::Development);
    }

    #[test]
    fn rejects_zero_limits() {
        let mut value = minimal_config_json();
        value["production_sessions"] = serde_json::json!(0);
        let config: IngestionConfig = serde_json::from_value(value).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_policy_string() {
        let mut value = minimal_config_json();
        value["duplicate_policy"] = serde_json::json!("latest-wins");
        assert!(serde_json::from_value::<IngestionConfig>(value).is_err());
    }
}
