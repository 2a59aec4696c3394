//! Configuration map.
//!
//! The configuration is collected by the interactive setup wizard and
//! persisted as a flat KEY=VALUE file. The orchestrator only reads it;
//! planner and controller are pure functions of (catalog, config).

use crate::error::{NimbusError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nimbus/nimbus.conf";

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "NIMBUS_CONFIG";

/// The exact value that enables a feature flag. Anything else disables.
const ENABLE_VALUE: &str = "yes";

/// Immutable key/value configuration, read once per invocation.
#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    values: BTreeMap<String, String>,
    path: Option<PathBuf>,
}

impl ConfigMap {
    /// Load the configuration from a KEY=VALUE file.
    ///
    /// Blank lines and `#` comments are ignored. Values may be wrapped in
    /// single or double quotes, which are stripped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NimbusError::Io { path: path.to_path_buf(), source: e })?;
        let mut map = Self::parse(&content)?;
        map.path = Some(path.to_path_buf());
        Ok(map)
    }

    /// Resolve the configuration path: explicit flag, then the
    /// `NIMBUS_CONFIG` environment variable, then the default location.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Parse KEY=VALUE content.
    pub fn parse(content: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| NimbusError::InvalidConfig {
                reason: format!("line {}: expected KEY=VALUE, got `{}`", lineno + 1, line),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(NimbusError::InvalidConfig {
                    reason: format!("line {}: empty key", lineno + 1),
                });
            }
            values.insert(key.to_string(), unquote(value.trim()).to_string());
        }
        Ok(Self { values, path: None })
    }

    /// Build a map from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            path: None,
        }
    }

    /// Path the map was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up a key. Empty values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Look up a key that must be present.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| NimbusError::MissingConfig { key: key.to_string() })
    }

    /// Whether a feature flag is enabled. The value must be exactly
    /// "yes"; absent, empty, or any other value reads as disabled.
    pub fn enabled(&self, key: &str) -> bool {
        self.get(key) == Some(ENABLE_VALUE)
    }

    /// Integer value with a fallback.
    pub fn get_u16(&self, key: &str, default: u16) -> Result<u16> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| NimbusError::InvalidConfig {
                reason: format!("{} must be a port number, got `{}`", key, v),
            }),
        }
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
