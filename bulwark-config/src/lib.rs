//! Configuration for Bulwark resilience policies.
//!
//! Policies are read from JSON, TOML or `.env` files and may be overridden by
//! `BULWARK_*` environment variables.
//!
//! ```
//! use bulwark_config::{EnvLoader, FileFormat, ResilienceSettings, Validate};
//!
//! let mut settings = ResilienceSettings::parse(
//!     "[breakers.payments]\nfailure_threshold = 3\n",
//!     FileFormat::Toml,
//! )
//! .unwrap();
//! settings
//!     .apply_env(&EnvLoader::from_vars("BULWARK", [("BULWARK_RETRY_MAX_ATTEMPTS", "5")]))
//!     .unwrap();
//! settings.validate().unwrap();
//!
//! assert_eq!(settings.retry_policy().max_attempts, 5);
//! assert_eq!(settings.breaker("payments").failure_threshold, 3);
//! ```

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{BreakerSettings, ResilienceSettings, RetrySettings, TimeoutSettings};
pub use validation::{ConfigValidator, Validate};
