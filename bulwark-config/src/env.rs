// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Prefix used when none is given.
pub const DEFAULT_PREFIX: &str = "BULWARK";

/// Snapshot of prefixed variables, keyed by the lowercased name with the
/// prefix removed (`BULWARK_RETRY_MAX_ATTEMPTS` becomes `retry_max_attempts`).
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: String,
    vars: BTreeMap<String, String>,
}

impl EnvLoader {
    /// Capture the process environment under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::from_vars(prefix, env::vars())
    }

    /// Capture the process environment under [`DEFAULT_PREFIX`].
    pub fn from_env() -> Self {
        Self::new(DEFAULT_PREFIX)
    }

    /// Build from explicit key/value pairs, keeping those under `prefix`.
    pub fn from_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let prefix = prefix.into();
        let mut loader = Self {
            prefix,
            vars: BTreeMap::new(),
        };
        loader.extend(vars);
        loader
    }

    /// Add variables from a `.env` file without touching the process environment.
    ///
    /// Variables already captured win over the file.
    pub fn with_dotenv(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let iter = dotenvy::from_path_iter(path.as_ref())
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        let mut from_file = Vec::new();
        for item in iter {
            from_file.push(item.map_err(|e| ConfigError::ParseError(e.to_string()))?);
        }

        let existing = std::mem::take(&mut self.vars);
        self.extend(from_file);
        self.vars.extend(existing);
        Ok(self)
    }

    fn extend<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let marker = format!("{}_", self.prefix);
        for (key, value) in vars {
            if let Some(rest) = key.as_ref().strip_prefix(&marker) {
                self.vars.insert(rest.to_lowercase(), value.into());
            }
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Raw value of `key` (without prefix, case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Load a specific variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        self.get(key).map(str::to_string).ok_or_else(|| {
            ConfigError::LoadError(format!("{}_{} is not set", self.prefix, key.to_uppercase()))
        })
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Parse `key` if present.
    pub fn parse_var<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
                key: format!("{}_{}", self.prefix, key.to_uppercase()),
                value: raw.to_string(),
            }),
        }
    }

    /// Captured keys (lowercased, prefix removed).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }
}
