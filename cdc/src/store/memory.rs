use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::CdcResult;
use crate::store::{CasOutcome, CoordinationStore, KeyValue, ListResponse, Revision};

#[derive(Debug, Default)]
struct Inner {
    revision: Revision,
    kvs: BTreeMap<String, (Vec<u8>, Revision)>,
}

impl Inner {
    fn write(&mut self, key: &str, value: Vec<u8>) -> Revision {
        self.revision += 1;
        self.kvs.insert(key.to_string(), (value, self.revision));
        self.revision
    }
}

/// In-process coordination store.
///
/// Every write bumps a single global revision, mirroring how a consensus-backed store versions
/// its keyspace. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryCoordinationStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current global revision.
    pub async fn revision(&self) -> Revision {
        self.inner.lock().await.revision
    }
}

impl CoordinationStore for MemoryCoordinationStore {
    async fn get(&self, key: &str) -> CdcResult<Option<KeyValue>> {
        let inner = self.inner.lock().await;
        Ok(inner.kvs.get(key).map(|(value, mod_revision)| KeyValue {
            key: key.to_string(),
            value: value.clone(),
            mod_revision: *mod_revision,
        }))
    }

    async fn list(&self, prefix: &str) -> CdcResult<ListResponse> {
        let inner = self.inner.lock().await;
        let kvs = inner
            .kvs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (value, mod_revision))| KeyValue {
                key: key.clone(),
                value: value.clone(),
                mod_revision: *mod_revision,
            })
            .collect();

        Ok(ListResponse {
            revision: inner.revision,
            kvs,
        })
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> CdcResult<Revision> {
        let mut inner = self.inner.lock().await;
        Ok(inner.write(key, value))
    }

    async fn compare_and_put(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Revision,
    ) -> CdcResult<CasOutcome> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .kvs
            .get(key)
            .map(|(_, mod_revision)| *mod_revision)
            .unwrap_or(0);

        if current != expected {
            return Ok(CasOutcome::Conflict { current });
        }

        Ok(CasOutcome::Written {
            revision: inner.write(key, value),
        })
    }
}
