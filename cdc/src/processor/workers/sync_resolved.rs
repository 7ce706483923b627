use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::Counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CdcResult;
use crate::mounter::Mounter;
use crate::schema::SchemaStorage;
use crate::sink::Sink;
use crate::types::{ProcessorEntry, RawTxn, Ts, Txn};

/// Merges schema changes with the ordered entries and delivers mounted transactions.
///
/// DDL jobs are registered with the [`SchemaStorage`] as soon as they are pulled and only applied
/// once the ordered stream reaches their timestamp, either right before a row change is mounted
/// or on a heartbeat. Resolved barriers are passed on to the local-resolved worker once every
/// entry before them was delivered.
pub struct SyncResolvedWorker<D> {
    mounter: Arc<dyn Mounter>,
    schema: Arc<dyn SchemaStorage>,
    sink: D,
    ddl_rx: mpsc::Receiver<RawTxn>,
    entries_rx: mpsc::Receiver<ProcessorEntry>,
    executed_tx: mpsc::Sender<ProcessorEntry>,
    ddl_resolved_ts: Arc<AtomicU64>,
    executed: Counter,
    cancel: CancellationToken,
}

impl<D> SyncResolvedWorker<D>
where
    D: Sink + Send + Sync + 'static,
{
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        mounter: Arc<dyn Mounter>,
        schema: Arc<dyn SchemaStorage>,
        sink: D,
        ddl_rx: mpsc::Receiver<RawTxn>,
        entries_rx: mpsc::Receiver<ProcessorEntry>,
        executed_tx: mpsc::Sender<ProcessorEntry>,
        ddl_resolved_ts: Arc<AtomicU64>,
        executed: Counter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            mounter,
            schema,
            sink,
            ddl_rx,
            entries_rx,
            executed_tx,
            ddl_resolved_ts,
            executed,
            cancel,
        }
    }

    pub async fn run(mut self) -> CdcResult<()> {
        info!(sink = D::name(), "sync resolved worker started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("sync resolved worker cancelled");
                    break;
                }
                txn = self.ddl_rx.recv() => match txn {
                    Some(txn) => self.handle_ddl_txn(txn)?,
                    None => {
                        info!("ddl channel closed");
                        break;
                    }
                },
                entry = self.entries_rx.recv() => match entry {
                    Some(ProcessorEntry::Dml(txn)) => self.handle_dml_txn(txn).await?,
                    Some(ProcessorEntry::Resolved(ts)) => {
                        if !self.forward_resolved(ts).await {
                            break;
                        }
                    }
                    None => {
                        info!("ordered entries channel closed");
                        break;
                    }
                },
            }
        }

        info!("sync resolved worker stopped");

        Ok(())
    }

    fn handle_ddl_txn(&self, txn: RawTxn) -> CdcResult<()> {
        if txn.is_resolved_heartbeat() {
            self.advance_ddl_resolved_ts(txn.ts);
            return Ok(());
        }

        match self.mounter.mount(&txn)? {
            Txn::Ddl { ts, job } => {
                info!(ts, job_id = job.id, query = %job.query, "ddl job received");
                self.schema.add_job(job)?;
                self.advance_ddl_resolved_ts(ts);
            }
            Txn::Dml { ts, .. } => {
                debug!(ts, "raw ddl transaction carries no job, skipping");
            }
        }

        Ok(())
    }

    async fn handle_dml_txn(&self, txn: RawTxn) -> CdcResult<()> {
        self.schema.handle_pending_ddl(txn.ts)?;

        // Heartbeats carry no rows to deliver.
        if txn.is_resolved_heartbeat() {
            return Ok(());
        }

        let mounted = self.mounter.mount(&txn)?;
        self.sink.emit(mounted).await?;
        self.executed.increment(1);

        Ok(())
    }

    /// Returns `false` if the worker has to stop instead.
    async fn forward_resolved(&self, ts: Ts) -> bool {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => false,
            result = self.executed_tx.send(ProcessorEntry::Resolved(ts)) => result.is_ok(),
        }
    }

    fn advance_ddl_resolved_ts(&self, ts: Ts) {
        self.ddl_resolved_ts.fetch_max(ts, Ordering::AcqRel);
    }
}
