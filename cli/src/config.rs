// Config file location for the CLI
//
// The service reads a flat JSON property file from:
// - macOS: ~/Library/Application Support/i2p-service/i2p-service.config
// - Linux: ~/.config/i2p-service/i2p-service.config
// - Windows: %APPDATA%\i2p-service\i2p-service.config

use anyhow::{Context, Result};
use i2p_service_core::config::ServiceConfig;
use i2p_service_core::CONFIG_FILE_NAME;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .context("Failed to determine config directory")?
        .join("i2p-service");
    Ok(dir)
}

/// Explicit `--config` path, else the per-user default
pub fn config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(config_dir()?.join(CONFIG_FILE_NAME)),
    }
}

/// Parse `key=value` pairs given on the command line
pub fn parse_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Expected key=value, got {:?}", pair))?;
            Ok((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

pub fn load(properties: &HashMap<String, String>, path: &Path) -> Result<ServiceConfig> {
    ServiceConfig::load_all(properties, Some(path))
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Store one property in the config file, creating it if needed
pub fn set(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut properties: BTreeMap<String, String> = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        BTreeMap::new()
    };
    properties.insert(key.to_string(), value.to_string());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(&properties)?;
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
