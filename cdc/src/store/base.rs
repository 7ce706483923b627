use std::future::Future;

use crate::error::CdcResult;

/// Monotonic version assigned by the coordination store to every write.
pub type Revision = i64;

/// A stored key with the revision of its last modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub mod_revision: Revision,
}

/// Result of a prefix read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResponse {
    /// Store revision at which the read was served.
    pub revision: Revision,
    /// Matching keys in key order.
    pub kvs: Vec<KeyValue>,
}

/// Outcome of a versioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The value was stored at `revision`.
    Written { revision: Revision },
    /// The stored revision differed from the expected one. `current` is `0` when the key is absent.
    Conflict { current: Revision },
}

/// Durable key-value store shared by the owner and every capture.
///
/// Implementations must be safe to share across tasks. A missing key is reported as `None`
/// rather than an error.
pub trait CoordinationStore {
    fn get(&self, key: &str) -> impl Future<Output = CdcResult<Option<KeyValue>>> + Send;

    /// Returns every key starting with `prefix`.
    fn list(&self, prefix: &str) -> impl Future<Output = CdcResult<ListResponse>> + Send;

    /// Unconditionally stores `value` and returns the new revision.
    fn put(&self, key: &str, value: Vec<u8>) -> impl Future<Output = CdcResult<Revision>> + Send;

    /// Stores `value` only if the key's current revision equals `expected`.
    ///
    /// An `expected` revision of `0` means the key must not exist yet.
    fn compare_and_put(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Revision,
    ) -> impl Future<Output = CdcResult<CasOutcome>> + Send;
}
