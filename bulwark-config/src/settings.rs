// Serializable resilience settings

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, ConfigLoader, EnvLoader, FileFormat, Result};
use bulwark_core::{CircuitBreakerConfig, RetryPolicy, TimeoutConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Retry settings with millisecond durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: duration_ms(policy.base_delay),
            backoff_multiplier: policy.backoff_multiplier,
            max_delay_ms: duration_ms(policy.max_delay),
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Validate for RetrySettings {
    fn validate(&self) -> Result<()> {
        self.to_policy().validate().map_err(|source| ConfigError::Policy {
            section: "retry".to_string(),
            source,
        })
    }
}

/// Settings for one named circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let config = CircuitBreakerConfig::default();
        Self {
            failure_threshold: config.failure_threshold,
            cooldown_ms: duration_ms(config.cooldown_period),
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self, name: &str) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(name)
            .failure_threshold(self.failure_threshold)
            .cooldown_period(Duration::from_millis(self.cooldown_ms))
    }
}

/// Timeout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSettings {
    pub duration_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            duration_ms: duration_ms(TimeoutConfig::default().duration),
        }
    }
}

impl TimeoutSettings {
    pub fn to_config(&self, name: &str) -> TimeoutConfig {
        TimeoutConfig::new(Duration::from_millis(self.duration_ms)).name(name)
    }
}

/// Every resilience policy of an application.
///
/// ```toml
/// [retry]
/// max_attempts = 4
/// base_delay_ms = 100
/// backoff_multiplier = 2.0
/// max_delay_ms = 5000
///
/// [timeout]
/// duration_ms = 2000
///
/// [breakers.payments]
/// failure_threshold = 3
/// cooldown_ms = 10000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceSettings {
    pub retry: RetrySettings,
    pub timeout: TimeoutSettings,
    pub breakers: BTreeMap<String, BreakerSettings>,
}

impl ResilienceSettings {
    /// Parse settings from a string in `format`.
    pub fn parse(content: &str, format: FileFormat) -> Result<Self> {
        let value = ConfigLoader::new(format).parse(content)?;
        match format {
            FileFormat::Env => {
                let vars = value
                    .as_object()
                    .into_iter()
                    .flatten()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())));
                let mut settings = Self::default();
                settings.apply_env(&EnvLoader::from_vars(crate::env::DEFAULT_PREFIX, vars))?;
                Ok(settings)
            }
            FileFormat::Json | FileFormat::Toml => Self::from_value(value),
        }
    }

    /// Load settings from a file, detecting the format from its name.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::detect(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Deserialize settings from an already parsed document.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Override settings from environment variables captured by `env`.
    ///
    /// Recognized keys (shown with the default `BULWARK` prefix):
    /// `BULWARK_RETRY_MAX_ATTEMPTS`, `BULWARK_RETRY_BASE_DELAY_MS`,
    /// `BULWARK_RETRY_BACKOFF_MULTIPLIER`, `BULWARK_RETRY_MAX_DELAY_MS`,
    /// `BULWARK_TIMEOUT_MS`, `BULWARK_BREAKER_<NAME>_FAILURE_THRESHOLD` and
    /// `BULWARK_BREAKER_<NAME>_COOLDOWN_MS`.
    pub fn apply_env(&mut self, env: &EnvLoader) -> Result<()> {
        if let Some(v) = env.parse_var("retry_max_attempts")? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = env.parse_var("retry_base_delay_ms")? {
            self.retry.base_delay_ms = v;
        }
        if let Some(v) = env.parse_var("retry_backoff_multiplier")? {
            self.retry.backoff_multiplier = v;
        }
        if let Some(v) = env.parse_var("retry_max_delay_ms")? {
            self.retry.max_delay_ms = v;
        }
        if let Some(v) = env.parse_var("timeout_ms")? {
            self.timeout.duration_ms = v;
        }

        let keys: Vec<String> = env.keys().map(str::to_string).collect();
        for key in keys {
            let Some(rest) = key.strip_prefix("breaker_") else {
                continue;
            };
            if let Some(name) = rest.strip_suffix("_failure_threshold") {
                if let Some(v) = env.parse_var(&key)? {
                    self.breaker_entry(name).failure_threshold = v;
                }
            } else if let Some(name) = rest.strip_suffix("_cooldown_ms") {
                if let Some(v) = env.parse_var(&key)? {
                    self.breaker_entry(name).cooldown_ms = v;
                }
            }
        }

        Ok(())
    }

    // Env keys arrive lowercased; reuse a configured breaker whose name differs only in case.
    fn breaker_entry(&mut self, name: &str) -> &mut BreakerSettings {
        let key = self
            .breakers
            .keys()
            .find(|configured| configured.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| name.to_string());
        self.breakers.entry(key).or_default()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.to_policy()
    }

    pub fn timeout_config(&self, name: &str) -> TimeoutConfig {
        self.timeout.to_config(name)
    }

    /// Breaker config for `name`, falling back to defaults when not configured.
    pub fn breaker(&self, name: &str) -> CircuitBreakerConfig {
        self.breakers
            .get(name)
            .cloned()
            .unwrap_or_default()
            .to_config(name)
    }
}

impl Validate for ResilienceSettings {
    fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        ConfigValidator::positive(self.timeout.duration_ms, "timeout.duration_ms")?;

        for (name, breaker) in &self.breakers {
            ConfigValidator::not_empty(name, "breaker name")?;
            breaker
                .to_config(name)
                .validate()
                .map_err(|source| ConfigError::Policy {
                    section: format!("breakers.{}", name),
                    source,
                })?;
        }
        Ok(())
    }
}
