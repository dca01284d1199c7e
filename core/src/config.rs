// Service configuration
//
// Configuration is a flat string property map. Sources are merged lowest to
// highest precedence:
//   defaults -> JSON config file -> environment -> explicit properties
// A handful of typed keys are parsed out; every key is kept verbatim in
// `params` so session and router options pass through untouched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "i2p-service.config";

pub const KEY_MAX_PEERS: &str = "ra.i2p.maxPeers";
pub const KEY_DISCOVERY_INTERVAL_SECS: &str = "ra.i2p.discoveryIntervalSecs";
pub const KEY_STATUS_CHECK_INTERVAL_SECS: &str = "ra.i2p.statusCheckIntervalSecs";
pub const KEY_CONNECT_TIMEOUT_SECS: &str = "ra.i2p.connectTimeoutSecs";

/// Longest accepted interval or timeout, in seconds (one day)
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Typed keys and the environment variables that can set them
const ENV_KEYS: [(&str, &str); 4] = [
    (KEY_MAX_PEERS, "I2P_SERVICE_MAX_PEERS"),
    (KEY_DISCOVERY_INTERVAL_SECS, "I2P_SERVICE_DISCOVERY_INTERVAL_SECS"),
    (KEY_STATUS_CHECK_INTERVAL_SECS, "I2P_SERVICE_STATUS_CHECK_INTERVAL_SECS"),
    (KEY_CONNECT_TIMEOUT_SECS, "I2P_SERVICE_CONNECT_TIMEOUT_SECS"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Peer capacity; discovery stops once the peer book reaches it
    pub max_peers: usize,
    pub discovery_interval_secs: u64,
    pub status_check_interval_secs: u64,
    /// Upper bound on a single router connect attempt
    pub connect_timeout_secs: u64,
    /// Every merged property, verbatim
    pub params: BTreeMap<String, String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_peers: 50,
            discovery_interval_secs: 30,
            status_check_interval_secs: 10,
            connect_timeout_secs: 30,
            params: BTreeMap::new(),
        }
    }
}

impl ServiceConfig {
    /// Merge file, process environment and explicit properties
    pub fn load_all(
        properties: &HashMap<String, String>,
        file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        Self::load_with_env(properties, file, |name| std::env::var(name).ok())
    }

    /// Merge file, environment (via `env`) and explicit properties
    pub fn load_with_env<F>(
        properties: &HashMap<String, String>,
        file: Option<&Path>,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = BTreeMap::new();

        if let Some(path) = file {
            merged.extend(read_config_file(path)?);
        }

        for (key, var) in ENV_KEYS {
            if let Some(value) = env(var) {
                merged.insert(key.to_string(), value);
            }
        }

        merged.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self::from_params(merged)
    }

    /// Build from an already merged property map
    pub fn from_params(params: BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_peers: parse_positive(&params, KEY_MAX_PEERS, defaults.max_peers as u64)? as usize,
            discovery_interval_secs: parse_interval(
                &params,
                KEY_DISCOVERY_INTERVAL_SECS,
                defaults.discovery_interval_secs,
            )?,
            status_check_interval_secs: parse_interval(
                &params,
                KEY_STATUS_CHECK_INTERVAL_SECS,
                defaults.status_check_interval_secs,
            )?,
            connect_timeout_secs: parse_interval(
                &params,
                KEY_CONNECT_TIMEOUT_SECS,
                defaults.connect_timeout_secs,
            )?,
            params,
        })
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn status_check_interval(&self) -> Duration {
        Duration::from_secs(self.status_check_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Read a flat JSON object of string values. A missing file is not an error.
fn read_config_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    if !path.exists() {
        debug!("No config file at {}", path.display());
        return Ok(BTreeMap::new());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_positive(
    params: &BTreeMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
            }),
        },
    }
}

/// Positive number of seconds, at most [`MAX_INTERVAL_SECS`]
fn parse_interval(
    params: &BTreeMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let secs = parse_positive(params, key, default)?;
    if secs > MAX_INTERVAL_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: secs.to_string(),
        });
    }
    Ok(secs)
}
