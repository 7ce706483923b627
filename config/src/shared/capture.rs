use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{ProcessorConfig, ValidationError};

/// Top-level configuration of a capture process.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Identifier of this capture inside the cluster.
    pub capture_id: String,
    /// Root under which every coordination key lives.
    ///
    /// Default: `/cdc`
    #[serde(default = "default_key_base")]
    pub key_base: String,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

impl CaptureConfig {
    pub const DEFAULT_KEY_BASE: &'static str = "/cdc";
}

impl Config for CaptureConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.capture_id.trim().is_empty() {
            return Err(ValidationError::CaptureIdEmpty);
        }

        if !self.key_base.starts_with('/') || self.key_base.len() < 2 || self.key_base.ends_with('/')
        {
            return Err(ValidationError::InvalidKeyBase(self.key_base.clone()));
        }

        self.processor.validate()
    }
}

fn default_key_base() -> String {
    CaptureConfig::DEFAULT_KEY_BASE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key_base: &str) -> CaptureConfig {
        CaptureConfig {
            capture_id: "capture-1".to_string(),
            key_base: key_base.to_string(),
            processor: ProcessorConfig::default(),
        }
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CaptureConfig = serde_json::from_str(r#"{ "capture_id": "c1" }"#).unwrap();
        assert_eq!(config.key_base, "/cdc");
        assert_eq!(config.processor, ProcessorConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_key_base() {
        assert!(config("/tidb/cdc").validate().is_ok());
        assert!(config("cdc").validate().is_err());
        assert!(config("/cdc/").validate().is_err());
        assert!(config("/").validate().is_err());
    }

    #[test]
    fn test_validate_empty_capture_id() {
        let mut config = config("/cdc");
        config.capture_id = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::CaptureIdEmpty)
        ));
    }
}
