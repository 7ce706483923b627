//! Key layout of the coordination store.
//!
//! ```text
//! <base>/changefeed/config/<changefeed_id>
//! <base>/changefeed/status/<changefeed_id>
//! <base>/changefeed/subchangefeed/<changefeed_id>/<capture_id>
//! <base>/capture/info/<capture_id>
//! ```

use config::shared::CaptureConfig;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};

/// Builds the keys of one deployment, all rooted at `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    base: String,
}

impl KeySpace {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.key_base.clone())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Prefix of every changefeed config key.
    pub fn changefeed_list(&self) -> String {
        format!("{}/changefeed/config/", self.base)
    }

    pub fn changefeed_config(&self, changefeed_id: &str) -> String {
        format!("{}{changefeed_id}", self.changefeed_list())
    }

    pub fn changefeed_status(&self, changefeed_id: &str) -> String {
        format!("{}/changefeed/status/{changefeed_id}", self.base)
    }

    /// Prefix of every sub-changefeed record of `changefeed_id`.
    pub fn sub_changefeed_list(&self, changefeed_id: &str) -> String {
        format!("{}/changefeed/subchangefeed/{changefeed_id}/", self.base)
    }

    pub fn sub_changefeed(&self, changefeed_id: &str, capture_id: &str) -> String {
        format!("{}{capture_id}", self.sub_changefeed_list(changefeed_id))
    }

    /// Prefix of the capture registry.
    pub fn capture_list(&self) -> String {
        format!("{}/capture/info/", self.base)
    }

    pub fn capture_info(&self, capture_id: &str) -> String {
        format!("{}{capture_id}", self.capture_list())
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(CaptureConfig::DEFAULT_KEY_BASE)
    }
}

/// Returns the last path segment of `key`, i.e. the id a record is stored under.
pub fn extract_key_suffix(key: &str) -> CdcResult<&str> {
    match key.rsplit_once('/') {
        Some((_, suffix)) if !suffix.is_empty() => Ok(suffix),
        _ => bail!(
            ErrorKind::InvalidKey,
            "Key has no id suffix",
            detail = key.to_string()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_layout() {
        let keys = KeySpace::new("/tidb/cdc");
        assert_eq!(keys.changefeed_list(), "/tidb/cdc/changefeed/config/");
        assert_eq!(keys.changefeed_config("cf"), "/tidb/cdc/changefeed/config/cf");
        assert_eq!(keys.changefeed_status("cf"), "/tidb/cdc/changefeed/status/cf");
        assert_eq!(
            keys.sub_changefeed_list("cf"),
            "/tidb/cdc/changefeed/subchangefeed/cf/"
        );
        assert_eq!(
            keys.sub_changefeed("cf", "cap"),
            "/tidb/cdc/changefeed/subchangefeed/cf/cap"
        );
        assert_eq!(keys.capture_list(), "/tidb/cdc/capture/info/");
        assert_eq!(keys.capture_info("cap"), "/tidb/cdc/capture/info/cap");
    }

    #[test]
    fn default_base() {
        assert_eq!(KeySpace::default().base(), "/cdc");
    }

    #[test]
    fn suffix_is_the_last_segment() {
        assert_eq!(
            extract_key_suffix("/cdc/changefeed/config/cf-1").unwrap(),
            "cf-1"
        );
        assert_eq!(extract_key_suffix("/a/b/c").unwrap(), "c");
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert_eq!(
            extract_key_suffix("no-slash").unwrap_err().kind(),
            ErrorKind::InvalidKey
        );
        assert_eq!(
            extract_key_suffix("/cdc/capture/info/").unwrap_err().kind(),
            ErrorKind::InvalidKey
        );
    }
}
