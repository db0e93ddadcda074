//! Configuration system for AskDB.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;

/// Main configuration struct for AskDB.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway listener settings
    pub server: ServerConfig,
    /// Session store and expiry settings
    pub session: SessionConfig,
    /// Reasoning engine settings
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Store backend: "memory" or "sqlite"
    pub backend: String,
    /// Data directory for the sqlite backend; defaults to the platform
    /// data dir when unset
    pub data_dir: Option<PathBuf>,
    /// Idle seconds before a session is expired and evicted
    pub idle_timeout_secs: u64,
    /// Interval between expiry sweeps
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            data_dir: None,
            idle_timeout_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine backend: "http" or "scripted"
    pub kind: String,
    /// Base URL of the remote reasoning service (http backend)
    pub base_url: Option<String>,
    /// Client-side timeout for one reasoning call
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: "scripted".to_string(),
            base_url: None,
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        let config_dir = Self::config_dir();

        Figment::new()
            // Default values
            .merge(figment::providers::Serialized::defaults(Config::default()))
            // User config
            .merge(Toml::file(config_dir.join("config.toml")))
            // Project config
            .merge(Toml::file("askdb.toml"))
            // Environment variables
            .merge(Env::prefixed("ASKDB_").split("_"))
            .extract()
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        let valid_backends = ["memory", "sqlite"];
        if !valid_backends.contains(&self.session.backend.as_str()) {
            return Err(Error::Config(format!(
                "Invalid session backend '{}'. Valid values: {:?}",
                self.session.backend, valid_backends
            )));
        }

        let valid_engines = ["http", "scripted"];
        if !valid_engines.contains(&self.engine.kind.as_str()) {
            return Err(Error::Config(format!(
                "Invalid engine kind '{}'. Valid values: {:?}",
                self.engine.kind, valid_engines
            )));
        }

        if self.engine.kind == "http" {
            match self.engine.base_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return Err(Error::Config(format!(
                        "engine.base_url must start with http:// or https://, got '{url}'"
                    )))
                }
                None => {
                    return Err(Error::Config(
                        "engine.base_url is required for the http engine".to_string(),
                    ))
                }
            }
        }

        if self.session.idle_timeout_secs == 0 {
            return Err(Error::Config(
                "session.idle_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.session.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "session.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.engine.timeout_secs == 0 {
            return Err(Error::Config(
                "engine.timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("askdb"))
            .unwrap_or_else(|| PathBuf::from("~/.config/askdb"))
    }

    /// Get the data directory (for the sqlite session store).
    pub fn data_dir(&self) -> PathBuf {
        self.session.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|p| p.join("askdb"))
                .unwrap_or_else(|| PathBuf::from("~/.local/share/askdb"))
        })
    }
}
