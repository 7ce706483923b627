use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::concurrency::retry::{RetryPolicy, retry_with_backoff};
use crate::error::CdcResult;
use crate::failpoints::{PROCESSOR_GLOBAL_RESOLVED_BEFORE_READ, cdc_fail_point};
use crate::processor::tables::TableManager;
use crate::puller::PullerFactory;
use crate::store::CoordinationStore;
use crate::store::client::CoordinationClient;
use crate::types::{ProcessorEntry, Ts};

/// Follows the changefeed's global resolved timestamp and releases table buffers up to it.
///
/// Every advance forwards all live tables concurrently into the ordered entries channel and then
/// publishes one [`ProcessorEntry::Resolved`] barrier. Dropping the worker closes that channel,
/// which is how the sync-resolved worker learns the stream is over.
#[derive(Debug)]
pub struct GlobalResolvedWorker<C, P> {
    changefeed_id: String,
    client: CoordinationClient<C>,
    tables: Arc<TableManager<P>>,
    retry: RetryPolicy,
    poll_interval: Duration,
    entries_tx: mpsc::Sender<ProcessorEntry>,
    cancel: CancellationToken,
}

impl<C, P> GlobalResolvedWorker<C, P>
where
    C: CoordinationStore + Clone + Send + Sync + 'static,
    P: PullerFactory,
{
    pub fn new(
        changefeed_id: String,
        client: CoordinationClient<C>,
        tables: Arc<TableManager<P>>,
        retry: RetryPolicy,
        poll_interval: Duration,
        entries_tx: mpsc::Sender<ProcessorEntry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            changefeed_id,
            client,
            tables,
            retry,
            poll_interval,
            entries_tx,
            cancel,
        }
    }

    pub async fn run(self) -> CdcResult<()> {
        info!("global resolved worker started");

        let mut last_global_resolved_ts: Ts = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let global_resolved_ts = match self.read_global_resolved_ts().await {
                Ok(ts) => ts,
                Err(err) if err.is_cancelled() => break,
                Err(err) => return Err(err),
            };

            let global_resolved_ts = match global_resolved_ts {
                Some(ts) if ts > last_global_resolved_ts => ts,
                _ => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
            };

            match self.forward_tables(global_resolved_ts).await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => break,
                Err(err) => return Err(err),
            }

            if !self.publish_barrier(global_resolved_ts).await {
                break;
            }

            debug!(global_resolved_ts, "global resolved ts forwarded");
            last_global_resolved_ts = global_resolved_ts;
        }

        info!("global resolved worker stopped");

        Ok(())
    }

    /// Reads the global resolved timestamp. A changefeed without status yet reads as `None`.
    async fn read_global_resolved_ts(&self) -> CdcResult<Option<Ts>> {
        let client = &self.client;
        let changefeed_id = self.changefeed_id.as_str();

        retry_with_backoff(&self.retry, &self.cancel, "read_global_resolved_ts", || async move {
            cdc_fail_point(PROCESSOR_GLOBAL_RESOLVED_BEFORE_READ)?;

            let status = client.get_changefeed_status(changefeed_id).await?;
            Ok(status.map(|status| status.resolved_ts))
        })
        .await
    }

    async fn forward_tables(&self, boundary: Ts) -> CdcResult<()> {
        // Snapshot under the lock, forward without it.
        let buffers = self.tables.buffers().await;

        let forwards = buffers
            .iter()
            .map(|buffer| buffer.forward(boundary, &self.entries_tx, &self.cancel));
        try_join_all(forwards).await?;

        Ok(())
    }

    /// Returns `false` if the worker has to stop instead.
    async fn publish_barrier(&self, ts: Ts) -> bool {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => false,
            result = self.entries_tx.send(ProcessorEntry::Resolved(ts)) => result.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::reporter::ErrorReporter;
    use crate::store::keys::KeySpace;
    use crate::store::memory::MemoryCoordinationStore;
    use crate::test_utils::puller::TestPullerFactory;
    use crate::types::{ChangeFeedStatus, RawTxn, Span};

    fn status(resolved_ts: Ts) -> ChangeFeedStatus {
        ChangeFeedStatus {
            resolved_ts,
            checkpoint_ts: 0,
        }
    }

    #[tokio::test]
    async fn advances_emit_prefix_then_barrier() {
        let client = CoordinationClient::new(MemoryCoordinationStore::new(), KeySpace::default());
        let factory = TestPullerFactory::new();
        let cancel = CancellationToken::new();
        let (reporter, _errors) = ErrorReporter::new(cancel.clone());
        let tables = Arc::new(TableManager::new(
            "cf".to_string(),
            "capture".to_string(),
            factory.clone(),
            reporter,
            cancel.clone(),
            1,
        ));
        tables.add_table(1, 0).await;
        for ts in [10, 20, 30] {
            factory.push(&Span::table(1), RawTxn::heartbeat(ts));
        }

        let (entries_tx, mut entries_rx) = mpsc::channel(1);
        let worker = GlobalResolvedWorker::new(
            "cf".to_string(),
            client.clone(),
            tables.clone(),
            RetryPolicy::immediate(3),
            Duration::from_millis(5),
            entries_tx,
            cancel.clone(),
        );
        let handle = tokio::spawn(worker.run());

        client.put_changefeed_status("cf", &status(15)).await.unwrap();
        assert_eq!(entries_rx.recv().await, Some(ProcessorEntry::Dml(RawTxn::heartbeat(10))));
        assert_eq!(entries_rx.recv().await, Some(ProcessorEntry::Resolved(15)));

        client.put_changefeed_status("cf", &status(25)).await.unwrap();
        assert_eq!(entries_rx.recv().await, Some(ProcessorEntry::Dml(RawTxn::heartbeat(20))));
        assert_eq!(entries_rx.recv().await, Some(ProcessorEntry::Resolved(25)));

        // Nothing else is released while the global resolved ts stays put.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(entries_rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(entries_rx.recv().await, None);

        tables.shutdown().await;
    }

    #[tokio::test]
    async fn barrier_without_tables() {
        let client = CoordinationClient::new(MemoryCoordinationStore::new(), KeySpace::default());
        let cancel = CancellationToken::new();
        let (reporter, _errors) = ErrorReporter::new(cancel.clone());
        let tables = Arc::new(TableManager::new(
            "cf".to_string(),
            "capture".to_string(),
            TestPullerFactory::new(),
            reporter,
            cancel.clone(),
            1,
        ));
        client.put_changefeed_status("cf", &status(7)).await.unwrap();

        let (entries_tx, mut entries_rx) = mpsc::channel(1);
        let worker = GlobalResolvedWorker::new(
            "cf".to_string(),
            client,
            tables,
            RetryPolicy::immediate(3),
            Duration::from_millis(5),
            entries_tx,
            cancel.clone(),
        );
        let handle = tokio::spawn(worker.run());

        assert_eq!(entries_rx.recv().await, Some(ProcessorEntry::Resolved(7)));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
