//! Configuration surface of the context engine, persisted as TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::explain::{ContextThresholds, CounterfactualConfig, RationaleConfig};
use crate::mining::MiningConfig;
use crate::physics::PhysicsConfig;
use crate::twin::TwinConfig;

/// Every component's settings. Missing sections and fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Rider and air constants
    pub physics: PhysicsConfig,
    /// Twin schema and regressor
    pub twin: TwinConfig,
    /// Counterfactual search
    pub counterfactual: CounterfactualConfig,
    /// Attribution bucketing
    pub rationale: RationaleConfig,
    /// Session verdict thresholds
    pub context: ContextThresholds,
    /// Rule mining
    pub mining: MiningConfig,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

/// Get the application config directory.
pub fn get_config_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "providenceit", "RideTwin")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    get_config_dir().join("ridetwin.toml")
}

/// Load configuration from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ContextConfig, ConfigError> {
    if !path.exists() {
        return Ok(ContextConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Save configuration to `path`, creating parent directories.
pub fn save_config(path: &Path, config: &ContextConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}
