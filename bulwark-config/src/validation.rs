// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is within range
    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate that a number is greater than zero
    pub fn positive(value: u64, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                field
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty_validation() {
        assert!(ConfigValidator::not_empty("payments", "name").is_ok());
        assert!(ConfigValidator::not_empty("", "name").is_err());
        assert!(ConfigValidator::not_empty("   ", "name").is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(ConfigValidator::in_range(5, 1, 10, "max_attempts").is_ok());
        assert!(ConfigValidator::in_range(0, 1, 10, "max_attempts").is_err());

        let err = ConfigValidator::in_range(11, 1, 10, "max_attempts").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: max_attempts must be between 1 and 10, got 11"
        );
    }

    #[test]
    fn test_positive_validation() {
        assert!(ConfigValidator::positive(1, "cooldown_ms").is_ok());
        assert!(ConfigValidator::positive(0, "cooldown_ms").is_err());
    }
}
