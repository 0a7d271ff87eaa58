//! Scanner configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/default.toml` unless another path is given)
//! 2. environment variables prefixed with `BARCODE_SESSION_`, nested keys
//!    separated by a double underscore
//!
//! Every field has a default, so a missing file yields [`ScannerConfig::default`].
//!
//! # Example
//! ```no_run
//! use barcode_session::config::ScannerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // BARCODE_SESSION_SCANNER__POLL_INTERVAL_MS=50 overrides the file
//! let config = ScannerConfig::load()?;
//! println!("Polling every {:?}", config.scanner.poll_interval());
//! # Ok(())
//! # }
//! ```

use crate::error::{ScanError, ScanResult};
use crate::hardware::camera::{CameraUnit, FocusMode};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BARCODE_SESSION_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Scan session settings
    #[serde(default)]
    pub scanner: ScannerSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// How failures of viewfinder property calls are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyPolicy {
    /// Log a warning and carry on with a neutral value
    #[default]
    BestEffort,
    /// Fail the session
    Strict,
}

/// Scan session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerSettings {
    /// Event queue polling interval in milliseconds (1-1000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Camera to open
    #[serde(default)]
    pub camera_unit: CameraUnit,
    /// Identifier given to the embedded viewfinder window
    #[serde(default = "default_viewfinder_window_id")]
    pub viewfinder_window_id: String,
    /// Focus mode set once streaming starts
    #[serde(default)]
    pub focus_mode: FocusMode,
    /// Handling of viewfinder property failures
    #[serde(default)]
    pub property_policy: PropertyPolicy,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            camera_unit: CameraUnit::default(),
            viewfinder_window_id: default_viewfinder_window_id(),
            focus_mode: FocusMode::default(),
            property_policy: PropertyPolicy::default(),
        }
    }
}

impl ScannerSettings {
    /// Polling interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// Default value functions
fn default_name() -> String {
    "Barcode Session".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_viewfinder_window_id() -> String {
    "barcode_viewfinder".to_string()
}

impl ScannerConfig {
    /// Load configuration from `config/default.toml` and environment variables
    ///
    /// Example: `BARCODE_SESSION_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> ScanResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path, then validate it
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate().map_err(ScanError::Configuration)?;
        Ok(config)
    }

    /// Provider stack used by [`load_from`](Self::load_from).
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if !(1..=1000).contains(&self.scanner.poll_interval_ms) {
            return Err(format!(
                "Invalid poll_interval_ms {}. Must be 1-1000",
                self.scanner.poll_interval_ms
            ));
        }

        if self.scanner.viewfinder_window_id.trim().is_empty() {
            return Err("viewfinder_window_id must not be empty".to_string());
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
