//! Bulwark Logging
//!
//! Logging setup for services built on Bulwark, controlled by `BULWARK_*`
//! environment variables.
//!
//! Bulwark's own crates emit `tracing` events (retry attempts, circuit
//! transitions, timeouts). This crate decides where those events, and any
//! `log` records from the application, end up.
//!
//! # Usage
//!
//! ```rust
//! use bulwark_log::{debug, info, warn};
//!
//! bulwark_log::init();
//!
//! info!("Starting with {} breakers", 3);
//! debug!(target: "bulwark::retry", "Attempt {} failed", 1);
//! warn!("Cooldown longer than request deadline");
//! ```
//!
//! # Environment Variables
//!
//! - `BULWARK_DEBUG=1` - Enable debug logging
//! - `BULWARK_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `BULWARK_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `BULWARK_LOG_COLOR=1|0` - Enable/disable colors
//! - `BULWARK_LOG_TIMESTAMPS=1|0` - Include timestamps
//! - `BULWARK_LOG_MODULE=1|0` - Include the module path / target

use once_cell::sync::Lazy;
use std::env;
use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use thiserror::Error;

// ============================================================================
// Log Levels
// ============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level (least verbose)
    Error = 4,
    /// Off (no logging)
    Off = 5,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter` and `log`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Off,
        }
    }

    fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Level::Trace => log::LevelFilter::Trace,
            Level::Debug => log::LevelFilter::Debug,
            Level::Info => log::LevelFilter::Info,
            Level::Warn => log::LevelFilter::Warn,
            Level::Error => log::LevelFilter::Error,
            Level::Off => log::LevelFilter::Off,
        }
    }

    /// Get colored level name (if color feature enabled).
    #[cfg(feature = "color")]
    pub fn colored(&self) -> colored::ColoredString {
        use colored::Colorize;
        match self {
            Level::Trace => "TRACE".magenta(),
            Level::Debug => "DEBUG".blue(),
            Level::Info => "INFO".green(),
            Level::Warn => "WARN".yellow(),
            Level::Error => "ERROR".red().bold(),
            Level::Off => "OFF".white(),
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-field human-readable lines
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure to install a global logger or subscriber.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("A global logger is already installed: {0}")]
    LoggerInstalled(String),

    #[error("A global tracing subscriber is already installed: {0}")]
    SubscriberInstalled(String),
}

// ============================================================================
// Global Configuration
// ============================================================================

/// Global debug flag - checked by macros.
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Global log level.
static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Global configuration (lazy initialized).
static CONFIG: Lazy<LogConfig> = Lazy::new(|| {
    let config = LogConfig::from_env();
    config.apply();
    config
});

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include module path
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
            module_path: true,
        }
    }
}

fn truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl LogConfig {
    /// Create config from `BULWARK_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| truthy(&v));

        let debug = flag("BULWARK_DEBUG").unwrap_or(false);

        let level = lookup("BULWARK_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("BULWARK_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = flag("BULWARK_LOG_COLOR").unwrap_or_else(|| {
            lookup("NO_COLOR").is_none() && std::io::stderr().is_terminal()
        });

        Self {
            debug,
            level,
            format,
            color,
            timestamps: flag("BULWARK_LOG_TIMESTAMPS").unwrap_or(true),
            module_path: flag("BULWARK_LOG_MODULE").unwrap_or(true),
        }
    }

    /// Publish this config's level and debug flag to the global atomics.
    fn apply(&self) {
        DEBUG_ENABLED.store(self.debug, Ordering::SeqCst);
        LOG_LEVEL.store(self.level as u8, Ordering::SeqCst);
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Initialize the logging system from the environment.
///
/// Called implicitly on first use of [`config`]; calling it early makes the
/// level available to the macros before anything is logged.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// Check if debug logging is enabled.
#[inline]
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Check if a log level is enabled.
#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    level != Level::Off && level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Get current log level.
pub fn current_level() -> Level {
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level at runtime.
///
/// Loads the environment config first so it cannot overwrite this later.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    log::set_max_level(level.to_level_filter());
}

/// Enable or disable debug mode at runtime.
pub fn set_debug(enabled: bool) {
    init();
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        set_level(Level::Debug);
    }
}

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

// ============================================================================
// Log Output
// ============================================================================

/// Log a message with the given level.
#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    if !is_level_enabled(level) {
        return;
    }

    let config = config();
    let line = render(level, target, message, config);
    let _ = writeln!(std::io::stderr().lock(), "{}", line);
}

/// Render one log line in the configured format.
pub fn render(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    match config.format {
        Format::Pretty => render_pretty(level, target, message, config),
        Format::Compact => render_compact(level, target, message, config),
        Format::Json => render_json(level, target, message, config),
    }
}

fn render_pretty(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    let mut line = String::new();

    if config.timestamps {
        let now = chrono::Local::now();
        line.push_str(&format!("{} ", now.format("%Y-%m-%d %H:%M:%S%.3f")));
    }

    #[cfg(feature = "color")]
    if config.color {
        line.push_str(&format!("{:5} ", level.colored()));
    } else {
        line.push_str(&format!("{:5} ", level.as_str()));
    }

    #[cfg(not(feature = "color"))]
    line.push_str(&format!("{:5} ", level.as_str()));

    if config.module_path && !target.is_empty() {
        line.push_str(&format!("[{}] ", target));
    }

    line.push_str(message);
    line
}

fn render_compact(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    let mut line = String::new();

    if config.timestamps {
        let now = chrono::Local::now();
        line.push_str(&format!("{} ", now.format("%H:%M:%S")));
    }

    line.push(level.as_str().chars().next().unwrap_or('?'));
    line.push(' ');

    if config.module_path && !target.is_empty() {
        line.push_str(&format!("{}: ", target));
    }

    line.push_str(message);
    line
}

#[cfg(feature = "json")]
fn render_json(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    use serde::Serialize;

    #[derive(Serialize)]
    struct LogEntry<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        level: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<&'a str>,
        message: &'a str,
    }

    let entry = LogEntry {
        timestamp: config.timestamps.then(|| chrono::Utc::now().to_rfc3339()),
        level: level.as_str(),
        target: (config.module_path && !target.is_empty()).then_some(target),
        message,
    };

    serde_json::to_string(&entry).unwrap_or_else(|_| message.to_string())
}

#[cfg(not(feature = "json"))]
fn render_json(level: Level, target: &str, message: &str, _config: &LogConfig) -> String {
    format!(
        r#"{{"timestamp":"{}","level":"{}","target":"{}","message":"{}"}}"#,
        chrono::Utc::now().to_rfc3339(),
        level.as_str(),
        escape_json(target),
        escape_json(message)
    )
}

#[cfg(not(feature = "json"))]
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

// ============================================================================
// `log` facade
// ============================================================================

/// Logger that routes `log` records through [`render`].
struct FacadeLogger;

impl log::Log for FacadeLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        is_level_enabled(metadata.level().into())
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            crate::log(record.level().into(), record.target(), &record.args().to_string());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static FACADE_LOGGER: FacadeLogger = FacadeLogger;

/// Install the `log` facade backend so dependencies using `log` share this output.
pub fn init_log_facade() -> Result<(), LogError> {
    init();
    log::set_logger(&FACADE_LOGGER).map_err(|e| LogError::LoggerInstalled(e.to_string()))?;
    log::set_max_level(current_level().to_level_filter());
    Ok(())
}

// ============================================================================
// Macros
// ============================================================================

/// Log a trace message.
///
/// Only enabled when `BULWARK_LOG_LEVEL=trace`.
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log a debug message.
///
/// Enabled by `BULWARK_DEBUG=1` or `BULWARK_LOG_LEVEL=debug`.
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log an info message.
#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log a warning message.
#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Warn) {
            $crate::log($crate::Level::Warn, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Warn) {
            $crate::log($crate::Level::Warn, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log an error message.
#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, module_path!(), &format!($($arg)+));
        }
    };
}

// ============================================================================
// Tracing Integration
// ============================================================================

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! Tracing subscriber that follows the `BULWARK_*` settings.
    //!
    //! `RUST_LOG`, when set, takes precedence over `BULWARK_LOG_LEVEL`.

    use super::*;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    /// Filter for the given config, preferring `RUST_LOG` when present.
    pub fn filter(config: &LogConfig) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()))
    }

    /// Create a subscriber for `config`.
    pub fn subscriber(config: &LogConfig) -> Box<dyn tracing::Subscriber + Send + Sync> {
        let registry = tracing_subscriber::registry().with(filter(config));
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.module_path)
            .with_ansi(config.color);

        match config.format {
            Format::Json => Box::new(registry.with(layer.json())),
            Format::Compact => Box::new(registry.with(layer.compact())),
            Format::Pretty => Box::new(registry.with(layer.pretty())),
        }
    }

    /// Install the subscriber for the global configuration.
    pub fn init_tracing() -> Result<(), LogError> {
        tracing::subscriber::set_global_default(subscriber(config()))
            .map_err(|e| LogError::SubscriberInstalled(e.to_string()))
    }
}

#[cfg(feature = "tracing")]
pub use tracing_compat::init_tracing;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse(" none "), Some(Level::Off));
        assert_eq!(Level::parse("invalid"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("Compact"), Some(Format::Compact));
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_config_from_lookup_defaults() {
        let config = LogConfig::from_lookup(lookup(&[("NO_COLOR", "1")]));

        assert!(!config.debug);
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, Format::Json);
        assert!(!config.color);
        assert!(config.timestamps);
        assert!(config.module_path);
    }

    #[test]
    fn test_debug_flag_lowers_default_level() {
        let config = LogConfig::from_lookup(lookup(&[("BULWARK_DEBUG", "true")]));
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);

        let config = LogConfig::from_lookup(lookup(&[
            ("BULWARK_DEBUG", "1"),
            ("BULWARK_LOG_LEVEL", "error"),
        ]));
        assert_eq!(config.level, Level::Error);
    }

    #[test]
    fn test_config_from_lookup_overrides() {
        let config = LogConfig::from_lookup(lookup(&[
            ("BULWARK_LOG_FORMAT", "compact"),
            ("BULWARK_LOG_COLOR", "1"),
            ("BULWARK_LOG_TIMESTAMPS", "0"),
            ("BULWARK_LOG_MODULE", "false"),
        ]));

        assert_eq!(config.format, Format::Compact);
        assert!(config.color);
        assert!(!config.timestamps);
        assert!(!config.module_path);
    }

    #[test]
    fn test_render_compact_without_timestamps() {
        let config = LogConfig {
            format: Format::Compact,
            timestamps: false,
            ..Default::default()
        };

        let line = render(Level::Warn, "bulwark::retry", "attempt 2 failed", &config);
        assert_eq!(line, "W bulwark::retry: attempt 2 failed");
    }

    #[test]
    fn test_render_pretty_without_timestamps() {
        let config = LogConfig {
            format: Format::Pretty,
            timestamps: false,
            color: false,
            ..Default::default()
        };

        let line = render(Level::Info, "bulwark", "ready", &config);
        assert_eq!(line, "INFO  [bulwark] ready");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_render_json() {
        let config = LogConfig {
            timestamps: false,
            ..Default::default()
        };

        let line = render(Level::Error, "bulwark::circuit", "circuit \"db\" opened", &config);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["level"], "ERROR");
        assert_eq!(value["target"], "bulwark::circuit");
        assert_eq!(value["message"], "circuit \"db\" opened");
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_set_level() {
        init();
        let original = current_level();

        set_level(Level::Error);
        assert_eq!(current_level(), Level::Error);
        assert!(!is_level_enabled(Level::Warn));

        set_level(Level::Debug);
        assert_eq!(current_level(), Level::Debug);
        assert!(is_level_enabled(Level::Warn));

        set_level(original);
    }

    #[test]
    fn test_off_is_never_enabled() {
        assert!(!is_level_enabled(Level::Off));
    }

    #[test]
    fn test_macros_compile() {
        trace!("trace message");
        debug!("debug message");
        info!("info message");
        warn!("warn message");
        error!("error message");

        trace!(target: "test", "with target");
        debug!(target: "test", "with target");
        info!(target: "test", "with target");
        warn!(target: "test", "with target");
        error!(target: "test", "with target");

        let attempts = 3;
        debug!("failed after {} attempts", attempts);
    }
}
