//! Configuration management for stitchcap.
//!
//! Handles loading and saving user configuration to platform-standard config directories:
//! - Linux: `~/.config/stitchcap/config.json`
//! - macOS: `~/Library/Application Support/stitchcap/config.json`
//! - Windows: `%APPDATA%\stitchcap\config.json`

use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stitchcap_common::CaptureParams;
use tracing::{info, warn};

/// Output-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Custom output directory. If None, uses system default (Videos folder).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

/// Session timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds of countdown before the first segment starts.
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
    /// Seconds to wait for an interrupted encoder before terminating it.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_countdown_secs() -> u32 {
    3
}

fn default_stop_timeout_secs() -> u64 {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl SessionConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Encoder selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EncoderConfig {
    /// Explicit ffmpeg binary. None resolves from the environment and PATH.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Custom capture command; `{output}` is replaced with the segment path.
    /// When set, the ffmpeg capture arguments are not used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Output settings group.
    #[serde(default)]
    pub output: OutputConfig,
    /// Capture parameters handed to the encoder.
    #[serde(default)]
    pub capture: CaptureParams,
    /// Countdown and stop timing.
    #[serde(default)]
    pub session: SessionConfig,
    /// Encoder binary and command overrides.
    #[serde(default)]
    pub encoder: EncoderConfig,
}

/// Get the path to the config file.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs = ProjectDirs::from("", "", "stitchcap").ok_or(ConfigError::NoConfigDir)?;
    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Load configuration from disk.
/// Returns default config if file doesn't exist or is invalid.
pub fn load_config() -> AppConfig {
    match get_config_path() {
        Ok(path) => load_config_from(&path),
        Err(e) => {
            warn!("Failed to get config path: {}", e);
            AppConfig::default()
        }
    }
}

/// Load configuration from a specific file, falling back to defaults.
pub fn load_config_from(path: &Path) -> AppConfig {
    if !path.exists() {
        info!("No config file found, using defaults");
        return AppConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
            Ok(config) => {
                info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Failed to parse config file: {}. Using defaults.", e);
                AppConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read config file: {}. Using defaults.", e);
            AppConfig::default()
        }
    }
}

/// Save configuration to disk.
/// Creates the config directory if it doesn't exist.
pub fn save_config(config: &AppConfig) -> Result<PathBuf, ConfigError> {
    let path = get_config_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save configuration to a specific file.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    info!("Saved config to {:?}", path);
    Ok(())
}
