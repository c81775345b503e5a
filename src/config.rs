//! Dispatcher Configuration
//!
//! Handles parsing and management of nativecall.toml configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`DispatcherConfig::find_and_load`].
pub const CONFIG_FILE_NAME: &str = "nativecall.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching nativecall.toml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DispatcherConfig {
    /// Library loading
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Cache behavior
    #[serde(default)]
    pub cache: CacheConfig,
}

impl DispatcherConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Add a directory probed after the platform search.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader.search_paths.push(path.into());
        self
    }

    /// Set the callable cache keying policy.
    pub fn with_callable_key(mut self, policy: CallableKeyPolicy) -> Self {
        self.cache.callable_key = policy;
        self
    }
}

/// Library loading settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Extra directories probed after the platform loader's own search
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Also try the platform file name (`libfoo.so`, `foo.dll`) for bare names
    #[serde(default = "default_true")]
    pub decorate_names: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            decorate_names: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Cache settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How synthesized callables are keyed
    #[serde(default)]
    pub callable_key: CallableKeyPolicy,
}

/// Keying policy for the callable cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallableKeyPolicy {
    /// One callable per address; the first signature seen wins
    #[default]
    Address,
    /// One callable per (address, signature) pair
    Signature,
}
