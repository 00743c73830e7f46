use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tracing::{debug, info};

// =============================================================================
// Default provider keys
// =============================================================================

/// Keys consulted for the raw version name, in order
pub const DEFAULT_VERSION_KEYS: [&str; 2] = ["VERSION_NAME", "CI_COMMIT_TAG"];

pub const DEFAULT_KEYSTORE_KEY: &str = "SIGNING_KEYSTORE_BASE64";
pub const DEFAULT_STORE_PASSWORD_KEY: &str = "SIGNING_STORE_PASSWORD";
pub const DEFAULT_KEY_ALIAS_KEY: &str = "SIGNING_KEY_ALIAS";
pub const DEFAULT_KEY_PASSWORD_KEY: &str = "SIGNING_KEY_PASSWORD";

/// Source of configuration values and credentials
///
/// Environment variables in CI, a vault client, or a fixed map in tests.
#[cfg_attr(test, automock)]
pub trait ConfigProvider {
    /// Returns the value stored under `key`, if any
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads values from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProvider;

impl ConfigProvider for EnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed set of values
#[derive(Debug, Clone, Default)]
pub struct MapProvider {
    values: HashMap<String, String>,
}

impl MapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigProvider for MapProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No version found in any of {keys:?} and no fallback configured")]
    VersionNotFound { keys: Vec<String> },
}

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub version: VersionConfig,
    pub signing: SigningConfig,
}

/// Where the raw version name comes from
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VersionConfig {
    /// Provider keys checked in order; the first non-blank value wins
    pub keys: Vec<String>,
    /// Used when none of the keys is set
    pub fallback: Option<String>,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            keys: DEFAULT_VERSION_KEYS.iter().map(|k| k.to_string()).collect(),
            fallback: None,
        }
    }
}

/// Provider keys holding release-signing material
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SigningConfig {
    /// Base64-encoded keystore
    pub keystore_key: String,
    pub store_password_key: String,
    pub key_alias_key: String,
    pub key_password_key: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            keystore_key: DEFAULT_KEYSTORE_KEY.to_string(),
            store_password_key: DEFAULT_STORE_PASSWORD_KEY.to_string(),
            key_alias_key: DEFAULT_KEY_ALIAS_KEY.to_string(),
            key_password_key: DEFAULT_KEY_PASSWORD_KEY.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load an explicit config file, or the default one if it exists.
    ///
    /// A missing explicit file is an error; a missing default file yields
    /// `Config::default()`.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let path = config_path();
        if path.is_file() {
            Self::load(&path)
        } else {
            debug!("No config file at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }
}

/// Resolve the raw version name from a provider.
pub fn resolve_raw_version(
    provider: &dyn ConfigProvider,
    config: &VersionConfig,
) -> Result<String, ConfigError> {
    for key in &config.keys {
        if let Some(value) = provider.get(key).filter(|v| !v.trim().is_empty()) {
            debug!("Using version '{}' from {}", value, key);
            return Ok(value);
        }
    }

    match &config.fallback {
        Some(fallback) => {
            info!(
                "None of {:?} is set, using fallback version '{}'",
                config.keys, fallback
            );
            Ok(fallback.clone())
        }
        None => Err(ConfigError::VersionNotFound {
            keys: config.keys.clone(),
        }),
    }
}

/// Returns the path to the default config file.
/// Uses $XDG_CONFIG_HOME/version-code/config.json if XDG_CONFIG_HOME is set,
/// otherwise falls back to ~/.config/version-code/config.json,
/// or ./version-code/config.json if neither is available.
pub fn config_path() -> PathBuf {
    config_path_with_env(std::env::var("XDG_CONFIG_HOME").ok(), dirs::home_dir())
}

fn config_path_with_env(xdg_config_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let config_dir = xdg_config_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    config_dir.join("version-code").join("config.json")
}
