use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::error::CdcResult;
use crate::store::memory::MemoryCoordinationStore;
use crate::store::{CasOutcome, CoordinationStore, KeyValue, ListResponse, Revision};
use crate::test_utils::notify::DEFAULT_NOTIFY_TIMEOUT;

#[derive(Debug, Default)]
struct Inner {
    writes: HashMap<String, usize>,
    conflicts: HashMap<String, usize>,
}

/// [`MemoryCoordinationStore`] that counts write attempts per key.
///
/// Both plain and versioned writes count, whether or not a versioned write was accepted.
#[derive(Debug, Clone, Default)]
pub struct RecordingCoordinationStore {
    store: MemoryCoordinationStore,
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl RecordingCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn writes(&self, key: &str) -> usize {
        self.inner.lock().await.writes.get(key).copied().unwrap_or(0)
    }

    /// Versioned writes to `key` rejected because of a concurrent change.
    pub async fn conflicts(&self, key: &str) -> usize {
        self.inner
            .lock()
            .await
            .conflicts
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Waits until `key` was written at least `count` times.
    ///
    /// # Panics
    ///
    /// Panics if that does not happen within [`DEFAULT_NOTIFY_TIMEOUT`].
    pub async fn wait_for_writes(&self, key: &str, count: usize) {
        self.wait_for_writes_with_timeout(key, count, DEFAULT_NOTIFY_TIMEOUT)
            .await
    }

    pub async fn wait_for_writes_with_timeout(&self, key: &str, count: usize, limit: Duration) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.writes(key).await >= count {
                    return;
                }

                notified.await;
            }
        };

        if timeout(limit, wait).await.is_err() {
            panic!("key {key} was not written {count} times within {limit:?}");
        }
    }

    async fn record_write(&self, key: &str, conflict: bool) {
        {
            let mut inner = self.inner.lock().await;
            *inner.writes.entry(key.to_string()).or_default() += 1;
            if conflict {
                *inner.conflicts.entry(key.to_string()).or_default() += 1;
            }
        }

        self.notify.notify_waiters();
    }
}

impl CoordinationStore for RecordingCoordinationStore {
    async fn get(&self, key: &str) -> CdcResult<Option<KeyValue>> {
        self.store.get(key).await
    }

    async fn list(&self, prefix: &str) -> CdcResult<ListResponse> {
        self.store.list(prefix).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> CdcResult<Revision> {
        let revision = self.store.put(key, value).await?;
        self.record_write(key, false).await;

        Ok(revision)
    }

    async fn compare_and_put(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Revision,
    ) -> CdcResult<CasOutcome> {
        let outcome = self.store.compare_and_put(key, value, expected).await?;
        self.record_write(key, matches!(outcome, CasOutcome::Conflict { .. }))
            .await;

        Ok(outcome)
    }
}
