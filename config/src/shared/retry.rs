use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Bounded exponential backoff applied to a retried coordination-store operation.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    ///
    /// Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay in milliseconds before the first retry.
    ///
    /// Default: 500
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound in milliseconds for any single delay.
    ///
    /// Default: 5000
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Factor applied to the delay after each failed attempt.
    ///
    /// Default: 2.0
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Jitter percentage (0-100) added or removed from each delay.
    ///
    /// Default: 10
    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: u8,
}

impl RetryConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

    pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

    pub const DEFAULT_JITTER_PERCENT: u8 = 10;

    /// Validates the retry configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_attempts".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "initial_delay_ms".to_string(),
                constraint: "must be <= max_delay_ms".to_string(),
            });
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "backoff_multiplier".to_string(),
                constraint: "must be a finite number >= 1.0".to_string(),
            });
        }

        if self.jitter_percent > 100 {
            return Err(ValidationError::InvalidFieldValue {
                field: "jitter_percent".to_string(),
                constraint: "must be <= 100".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: Self::DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: Self::DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: Self::DEFAULT_BACKOFF_MULTIPLIER,
            jitter_percent: Self::DEFAULT_JITTER_PERCENT,
        }
    }
}

fn default_max_attempts() -> u32 {
    RetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_DELAY_MS
}

fn default_backoff_multiplier() -> f64 {
    RetryConfig::DEFAULT_BACKOFF_MULTIPLIER
}

fn default_jitter_percent() -> u8 {
    RetryConfig::DEFAULT_JITTER_PERCENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 5_000);
        assert_eq!(config.jitter_percent, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_initial_greater_than_max() {
        let config = RetryConfig {
            initial_delay_ms: 10_000,
            max_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_shrinking_multiplier() {
        let config = RetryConfig {
            backoff_multiplier: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
