//! Configuration (`tether.toml`)
//!
//! ```toml
//! [bridge]
//! sync_timeout_ms = 10000
//! default_context = "background"
//!
//! [server]
//! root = "www"
//! overlays = ["overrides"]
//! host = "127.0.0.1"
//! port = 0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default synchronous hand-off timeout
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 10_000;

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a synchronous cross-context call waits, in milliseconds
    pub sync_timeout_ms: u64,

    /// Name of a background context for async calls from threads without a
    /// run loop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_context: Option<String>,
}

impl BridgeConfig {
    /// Timeout as a `Duration`
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bridge.sync_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(name) = &self.default_context {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "bridge.default_context cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            sync_timeout_ms: DEFAULT_SYNC_TIMEOUT_MS,
            default_context: None,
        }
    }
}

/// Document-root server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Document root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Directories searched before the root; later entries shadow earlier ones
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<PathBuf>,

    /// Listen address
    pub host: String,

    /// Listen port (0 picks an ephemeral port)
    pub port: u16,
}

impl ServerConfig {
    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.host cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            root: None,
            overlays: Vec::new(),
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TetherConfig {
    /// Dispatcher settings
    pub bridge: BridgeConfig,

    /// Server settings
    pub server: ServerConfig,
}

impl TetherConfig {
    /// Load and validate a config file.
    ///
    /// Relative server paths are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate config text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: TetherConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bridge.validate()?;
        self.server.validate()
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &PathBuf| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.clone()
            }
        };
        self.server.root = self.server.root.as_ref().map(resolve);
        self.server.overlays = self.server.overlays.iter().map(resolve).collect();
    }
}
