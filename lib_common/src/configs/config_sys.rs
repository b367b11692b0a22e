use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use thiserror::Error;

use config::{ext::*, *};

/// File name looked up when no explicit settings path is given.
pub const CONFIG_DEFAULT_NAME: &str = "settings.ini";

/// Section whose keys are visible from every other section.
const DEFAULT_SECTION: &str = "default";

#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("Configuration file {0} does not exist")]
    MissingFile(PathBuf),

    #[error("Failed to load configuration file {path}: {reason}")]
    LoadError { path: PathBuf, reason: String },

    #[error("Required configuration key '{0}' is not present")]
    MissingKey(String),

    #[error("Invalid value '{value}' for configuration key '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// # Runtime Config
///
/// Flat view of the settings file. Keys are stored lower-cased as
/// `section:key`; a lookup for `section:key` falls back to `default:key` and
/// then to a bare `key`, so values declared under `[DEFAULT]` are visible from
/// every section.
#[derive(Default, Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all(deserialize = "PascalCase"))]
#[serde(rename_all(serialize = "PascalCase"))]
pub struct RuntimeConfig {
    pub config_file: String,
    pub config_options: BTreeMap<String, String>,
}

impl RuntimeConfig {
    pub fn new(config_file: String, config_options: BTreeMap<String, String>) -> Self {
        let config_options = config_options
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();
        Self {
            config_file,
            config_options,
        }
    }

    /// Builds a config from in-memory pairs. Used by tests and by callers that
    /// assemble settings programmatically.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let options = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::new(String::new(), options)
    }

    /// Returns the non-blank value stored for `key`, honouring `[DEFAULT]` fallback.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        let bare = key.rsplit(':').next().unwrap_or(&key).to_string();
        let candidates = [key.clone(), format!("{}:{}", DEFAULT_SECTION, bare), bare];

        candidates
            .iter()
            .filter_map(|candidate| self.config_options.get(candidate))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, RuntimeConfigError> {
        self.get(key)
            .ok_or_else(|| RuntimeConfigError::MissingKey(key.to_string()))
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parses the value for `key`, or returns `default` when the key is absent.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, RuntimeConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| RuntimeConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Comma-separated list value, trimmed, with empty items removed.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuntimeConfig
    Config file: {},
    Options: {:?}
",
            self.config_file, self.config_options
        )
    }
}

/// Loads an INI settings file into a [`RuntimeConfig`].
pub fn load_runtime_config(path: &Path) -> Result<RuntimeConfig, RuntimeConfigError> {
    if !path.is_file() {
        return Err(RuntimeConfigError::MissingFile(path.to_path_buf()));
    }
    let _config_file: String = path.to_string_lossy().to_string();

    let _config_data: Box<dyn ConfigurationRoot> = DefaultConfigurationBuilder::new()
        .add_ini_file(&_config_file.is().optional())
        .build()
        .map_err(|e| RuntimeConfigError::LoadError {
            path: path.to_path_buf(),
            reason: format!("{:?}", e),
        })?;

    let mut _config_options: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in _config_data.iter(None) {
        _config_options.insert(key.to_string(), value.to_string());
    }

    Ok(RuntimeConfig::new(_config_file, _config_options))
}
