use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CdcResult;
use crate::sink::Sink;
use crate::types::{RowChangedEvent, Txn};

#[derive(Debug, Default)]
struct Inner {
    txns: Vec<Txn>,
    shutdown: bool,
}

/// In-memory sink recording every emitted transaction.
///
/// Clones share the same storage, so a test can keep one copy and inspect what the processor
/// delivered through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every transaction emitted so far, in emission order.
    pub async fn txns(&self) -> Vec<Txn> {
        let inner = self.inner.lock().await;
        inner.txns.clone()
    }

    /// Returns the row changes of every emitted DML transaction, in emission order.
    pub async fn rows(&self) -> Vec<RowChangedEvent> {
        let inner = self.inner.lock().await;
        inner
            .txns
            .iter()
            .filter_map(|txn| match txn {
                Txn::Dml { rows, .. } => Some(rows.iter().cloned()),
                Txn::Ddl { .. } => None,
            })
            .flatten()
            .collect()
    }

    pub async fn is_shutdown(&self) -> bool {
        self.inner.lock().await.shutdown
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.txns.clear();
    }
}

impl Sink for MemorySink {
    fn name() -> &'static str {
        "memory"
    }

    async fn shutdown(&self) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;
        inner.shutdown = true;

        Ok(())
    }

    async fn emit(&self, txn: Txn) -> CdcResult<()> {
        debug!(ts = txn.ts(), is_ddl = txn.is_ddl(), "emitting transaction");

        let mut inner = self.inner.lock().await;
        inner.txns.push(txn);

        Ok(())
    }
}
