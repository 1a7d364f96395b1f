//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/firelens/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/firelens/` (~/.config/firelens/)
//! - State/Logs: `$XDG_STATE_HOME/firelens/` (~/.local/state/firelens/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Backend endpoints for the geo query and chat stream
    #[serde(default)]
    pub api: ApiConfig,

    /// Map source, layer and timing settings
    #[serde(default)]
    pub map: MapConfig,

    /// Chat stream decoding settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Reverse geocoding (optional)
    #[serde(default)]
    pub geocoding: GeocodingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Base URL serving `/api/map` and `/api/chat`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User identifier sent with every chat request
    #[serde(default = "default_user")]
    pub user: String,

    /// Timeout for geo queries in seconds (chat streams are not bounded)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user: default_user(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_user() -> String {
    "test-user".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Map configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    /// Logical source name the hotspot features are bound to
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Id of the point layer drawn from the source
    #[serde(default = "default_layer_id")]
    pub layer_id: String,

    /// Quiet window for coalescing move/zoom settle events
    #[serde(default = "default_settle_debounce_ms")]
    pub settle_debounce_ms: u64,

    /// Minimum interval between pulse animation frames (~24fps)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Base style URL
    #[serde(default = "default_base_style")]
    pub base_style: String,

    /// Style URL required by the wind particle layer
    #[serde(default = "default_wind_style")]
    pub wind_style: String,

    /// Share of the container width used as right padding on fly-to
    #[serde(default = "default_lateral_offset_ratio")]
    pub lateral_offset_ratio: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            source_name: default_source_name(),
            layer_id: default_layer_id(),
            settle_debounce_ms: default_settle_debounce_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            base_style: default_base_style(),
            wind_style: default_wind_style(),
            lateral_offset_ratio: default_lateral_offset_ratio(),
        }
    }
}

impl MapConfig {
    pub fn settle_debounce(&self) -> Duration {
        Duration::from_millis(self.settle_debounce_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

fn default_source_name() -> String {
    "fire_points".to_string()
}

fn default_layer_id() -> String {
    "fire_points_layer".to_string()
}

fn default_settle_debounce_ms() -> u64 {
    500
}

fn default_frame_interval_ms() -> u64 {
    42
}

fn default_base_style() -> String {
    "mapbox://styles/mapbox/standard".to_string()
}

fn default_wind_style() -> String {
    "mapbox://styles/mapbox/dark-v11".to_string()
}

fn default_lateral_offset_ratio() -> f64 {
    0.3
}

/// Chat stream decoding configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Inline tag opening a reasoning span
    #[serde(default = "default_open_tag")]
    pub reasoning_open_tag: String,

    /// Inline tag closing a reasoning span
    #[serde(default = "default_close_tag")]
    pub reasoning_close_tag: String,

    /// Key of the terminal outputs map holding the JSON-encoded report
    #[serde(default = "default_payload_field")]
    pub payload_field: String,

    /// Prefix of an echoed report that is stripped from the answer text
    #[serde(default = "default_payload_marker")]
    pub payload_marker: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reasoning_open_tag: default_open_tag(),
            reasoning_close_tag: default_close_tag(),
            payload_field: default_payload_field(),
            payload_marker: default_payload_marker(),
        }
    }
}

fn default_open_tag() -> String {
    "<think>".to_string()
}

fn default_close_tag() -> String {
    "</think>".to_string()
}

fn default_payload_field() -> String {
    "chart_data".to_string()
}

fn default_payload_marker() -> String {
    "{\"analysis_valid\"".to_string()
}

/// Reverse geocoding configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GeocodingConfig {
    /// Access token; geocoding is disabled when absent
    pub access_token: Option<String>,

    /// Geocoding API endpoint
    #[serde(default = "default_geocoding_endpoint")]
    pub endpoint: String,

    /// Preferred language of place names
    #[serde(default = "default_geocoding_language")]
    pub language: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            endpoint: default_geocoding_endpoint(),
            language: default_geocoding_language(),
        }
    }
}

impl GeocodingConfig {
    pub fn is_ready(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

fn default_geocoding_endpoint() -> String {
    "https://api.mapbox.com".to_string()
}

fn default_geocoding_language() -> String {
    "zh".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate values that would break the synchronizer or the decoder
    pub fn validate(&self) -> Result<()> {
        let chat = &self.chat;
        if chat.reasoning_open_tag.is_empty() || chat.reasoning_close_tag.is_empty() {
            return Err(Error::Config(
                "chat reasoning tags must not be empty".to_string(),
            ));
        }
        if chat.reasoning_open_tag == chat.reasoning_close_tag {
            return Err(Error::Config(
                "chat.reasoning_open_tag and chat.reasoning_close_tag must differ".to_string(),
            ));
        }
        if chat.payload_marker.is_empty() {
            return Err(Error::Config(
                "chat.payload_marker must not be empty".to_string(),
            ));
        }
        if self.map.settle_debounce_ms == 0 {
            return Err(Error::Config(
                "map.settle_debounce_ms must be greater than 0".to_string(),
            ));
        }
        if self.map.frame_interval_ms == 0 {
            return Err(Error::Config(
                "map.frame_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.map.lateral_offset_ratio) {
            return Err(Error::Config(
                "map.lateral_offset_ratio must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/firelens/config.toml` (~/.config/firelens/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("firelens").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/firelens/` (~/.local/state/firelens/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("firelens")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/firelens/firelens.log` (~/.local/state/firelens/firelens.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("firelens.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// CLI binaries call this before anything reads these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
