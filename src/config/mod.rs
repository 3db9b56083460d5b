//! Engine Configuration Module
//!
//! Provides the engine configuration loaded from TOML files plus the record
//! the host passes to the `init` RPC, replacing hardcoded tuning values with
//! operator-editable ones.
//!
//! ## Loading Order
//!
//! 1. `BATCOM_CONFIG` environment variable (path to TOML file)
//! 2. `batcom.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The host's `init` record is then merged on top of whatever was loaded, so
//! mission scripts can override individual sections without shipping a file.

mod engine_config;
pub mod validation;

pub use engine_config::*;
pub use validation::{validate, ConfigError};

use std::path::{Path, PathBuf};
use tracing::{info, warn};

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$BATCOM_CONFIG` environment variable
    /// 2. `./batcom.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("BATCOM_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from BATCOM_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from BATCOM_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "BATCOM_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("batcom.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./batcom.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./batcom.toml, using defaults");
                }
            }
        }

        info!("Using built-in default engine config");
        Self::default()
    }

    /// Load and parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigLoadError::Io(path.display().to_string(), e))?;
        let config: EngineConfig = toml::from_str(&text)?;
        Ok(config)
    }
}

/// Errors raised while reading a config file from disk.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
