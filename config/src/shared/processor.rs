use serde::{Deserialize, Serialize};

use crate::shared::{RetryConfig, ValidationError};

/// Timing and sizing knobs for a per-capture changefeed processor.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ProcessorConfig {
    /// Interval in milliseconds between local resolved-ts computations.
    ///
    /// Default: 1000
    #[serde(default = "default_resolve_interval_ms")]
    pub resolve_interval_ms: u64,

    /// Interval in milliseconds between sub-changefeed info writes.
    ///
    /// Default: 1000
    #[serde(default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,

    /// Sleep in milliseconds after observing an unchanged global resolved ts.
    ///
    /// Default: 500
    #[serde(default = "default_global_resolved_poll_interval_ms")]
    pub global_resolved_poll_interval_ms: u64,

    /// Bound in milliseconds on the final write performed during shutdown.
    ///
    /// Default: 1000
    #[serde(default = "default_final_persist_timeout_ms")]
    pub final_persist_timeout_ms: u64,

    /// Attempts for a single sub-changefeed info write before giving up. A conflict counts as done.
    ///
    /// Default: 3
    #[serde(default = "default_persist_max_attempts")]
    pub persist_max_attempts: u32,

    /// Backoff used when reading the global changefeed status.
    #[serde(default)]
    pub global_resolved_retry: RetryConfig,

    /// Capacity of each table's raw transaction channel.
    ///
    /// Default: 1
    #[serde(default = "default_table_buffer_size")]
    pub table_buffer_size: usize,

    /// Capacity of the channel carrying DDL transactions.
    ///
    /// Default: 16
    #[serde(default = "default_ddl_channel_size")]
    pub ddl_channel_size: usize,

    /// Capacity of the output and resolved-ts channels between workers.
    ///
    /// Default: 1
    #[serde(default = "default_entry_channel_size")]
    pub entry_channel_size: usize,
}

impl ProcessorConfig {
    pub const DEFAULT_RESOLVE_INTERVAL_MS: u64 = 1_000;

    pub const DEFAULT_PERSIST_INTERVAL_MS: u64 = 1_000;

    pub const DEFAULT_GLOBAL_RESOLVED_POLL_INTERVAL_MS: u64 = 500;

    pub const DEFAULT_FINAL_PERSIST_TIMEOUT_MS: u64 = 1_000;

    pub const DEFAULT_PERSIST_MAX_ATTEMPTS: u32 = 3;

    pub const DEFAULT_TABLE_BUFFER_SIZE: usize = 1;

    pub const DEFAULT_DDL_CHANNEL_SIZE: usize = 16;

    pub const DEFAULT_ENTRY_CHANNEL_SIZE: usize = 1;

    /// Validates the processor configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let non_zero_intervals = [
            ("resolve_interval_ms", self.resolve_interval_ms),
            ("persist_interval_ms", self.persist_interval_ms),
            (
                "global_resolved_poll_interval_ms",
                self.global_resolved_poll_interval_ms,
            ),
            ("final_persist_timeout_ms", self.final_persist_timeout_ms),
        ];
        for (field, value) in non_zero_intervals {
            if value == 0 {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must be greater than 0".to_string(),
                });
            }
        }

        if self.persist_max_attempts == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "persist_max_attempts".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        // Tokio channels panic on a zero capacity.
        let capacities = [
            ("table_buffer_size", self.table_buffer_size),
            ("ddl_channel_size", self.ddl_channel_size),
            ("entry_channel_size", self.entry_channel_size),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must be greater than 0".to_string(),
                });
            }
        }

        self.global_resolved_retry.validate()
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            resolve_interval_ms: Self::DEFAULT_RESOLVE_INTERVAL_MS,
            persist_interval_ms: Self::DEFAULT_PERSIST_INTERVAL_MS,
            global_resolved_poll_interval_ms: Self::DEFAULT_GLOBAL_RESOLVED_POLL_INTERVAL_MS,
            final_persist_timeout_ms: Self::DEFAULT_FINAL_PERSIST_TIMEOUT_MS,
            persist_max_attempts: Self::DEFAULT_PERSIST_MAX_ATTEMPTS,
            global_resolved_retry: RetryConfig::default(),
            table_buffer_size: Self::DEFAULT_TABLE_BUFFER_SIZE,
            ddl_channel_size: Self::DEFAULT_DDL_CHANNEL_SIZE,
            entry_channel_size: Self::DEFAULT_ENTRY_CHANNEL_SIZE,
        }
    }
}

fn default_resolve_interval_ms() -> u64 {
    ProcessorConfig::DEFAULT_RESOLVE_INTERVAL_MS
}

fn default_persist_interval_ms() -> u64 {
    ProcessorConfig::DEFAULT_PERSIST_INTERVAL_MS
}

fn default_global_resolved_poll_interval_ms() -> u64 {
    ProcessorConfig::DEFAULT_GLOBAL_RESOLVED_POLL_INTERVAL_MS
}

fn default_final_persist_timeout_ms() -> u64 {
    ProcessorConfig::DEFAULT_FINAL_PERSIST_TIMEOUT_MS
}

fn default_persist_max_attempts() -> u32 {
    ProcessorConfig::DEFAULT_PERSIST_MAX_ATTEMPTS
}

fn default_table_buffer_size() -> usize {
    ProcessorConfig::DEFAULT_TABLE_BUFFER_SIZE
}

fn default_ddl_channel_size() -> usize {
    ProcessorConfig::DEFAULT_DDL_CHANNEL_SIZE
}

fn default_entry_channel_size() -> usize {
    ProcessorConfig::DEFAULT_ENTRY_CHANNEL_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProcessorConfig::default();
        assert_eq!(config.resolve_interval_ms, 1_000);
        assert_eq!(config.persist_interval_ms, 1_000);
        assert_eq!(config.global_resolved_poll_interval_ms, 500);
        assert_eq!(config.ddl_channel_size, 16);
        assert_eq!(config.table_buffer_size, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: ProcessorConfig =
            serde_json::from_str(r#"{ "persist_interval_ms": 250 }"#).unwrap();
        assert_eq!(config.persist_interval_ms, 250);
        assert_eq!(config.resolve_interval_ms, 1_000);
        assert_eq!(config.global_resolved_retry, RetryConfig::default());
    }

    #[test]
    fn test_validate_zero_channel_size() {
        let config = ProcessorConfig {
            entry_channel_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("entry_channel_size"));
    }

    #[test]
    fn test_validate_nested_retry() {
        let config = ProcessorConfig {
            global_resolved_retry: RetryConfig {
                jitter_percent: 150,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
