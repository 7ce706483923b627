use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use config::shared::ProcessorConfig;
use metrics::gauge;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};
use crate::metrics::{
    CAPTURE_ID_LABEL, CDC_PROCESSOR_CHECKPOINT_TS, CDC_PROCESSOR_RESOLVED_TS, CHANGEFEED_ID_LABEL,
};
use crate::processor::progress::SubChangeFeedProgress;
use crate::processor::tables::TableManager;
use crate::puller::PullerFactory;
use crate::store::CoordinationStore;
use crate::types::ProcessorEntry;

/// Delay between two attempts of the same persistence tick.
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Aggregates per-table progress into the local resolved timestamp, advances the checkpoint on
/// every executed barrier and periodically persists the result.
///
/// Exactly one final persistence attempt is made when the worker stops, whatever the reason.
#[derive(Debug)]
pub struct LocalResolvedWorker<C, P> {
    changefeed_id: String,
    capture_id: String,
    config: Arc<ProcessorConfig>,
    progress: SubChangeFeedProgress<C, P>,
    tables: Arc<TableManager<P>>,
    ddl_resolved_ts: Arc<AtomicU64>,
    executed_rx: mpsc::Receiver<ProcessorEntry>,
    cancel: CancellationToken,
}

impl<C, P> LocalResolvedWorker<C, P>
where
    C: CoordinationStore + Clone + Send + Sync + 'static,
    P: PullerFactory,
{
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        changefeed_id: String,
        capture_id: String,
        config: Arc<ProcessorConfig>,
        progress: SubChangeFeedProgress<C, P>,
        tables: Arc<TableManager<P>>,
        ddl_resolved_ts: Arc<AtomicU64>,
        executed_rx: mpsc::Receiver<ProcessorEntry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            changefeed_id,
            capture_id,
            config,
            progress,
            tables,
            ddl_resolved_ts,
            executed_rx,
            cancel,
        }
    }

    pub async fn run(mut self) -> CdcResult<()> {
        info!("local resolved worker started");

        let result = self.run_loop().await;
        self.final_persist().await;

        info!("local resolved worker stopped");

        result
    }

    async fn run_loop(&mut self) -> CdcResult<()> {
        let resolve_interval = Duration::from_millis(self.config.resolve_interval_ms);
        let persist_interval = Duration::from_millis(self.config.persist_interval_ms);

        let mut resolve_tick = interval_at(Instant::now() + resolve_interval, resolve_interval);
        resolve_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut persist_tick = interval_at(Instant::now() + persist_interval, persist_interval);
        persist_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("local resolved worker cancelled");
                    return Ok(());
                }
                entry = self.executed_rx.recv() => match entry {
                    Some(ProcessorEntry::Resolved(ts)) => self.advance_checkpoint(ts),
                    Some(ProcessorEntry::Dml(txn)) => {
                        warn!(ts = txn.ts, "unexpected dml entry on the executed channel, ignoring");
                    }
                    None => {
                        debug!("executed channel closed");
                        return Ok(());
                    }
                },
                _ = resolve_tick.tick() => self.resolve().await,
                _ = persist_tick.tick() => self.persist_with_retry().await?,
            }
        }
    }

    /// Computes the local resolved timestamp as the minimum of every table and the ddl puller.
    async fn resolve(&mut self) {
        let Some(tables_resolved_ts) = self.tables.min_resolved_ts().await else {
            return;
        };

        let ddl_resolved_ts = self.ddl_resolved_ts.load(Ordering::Acquire);
        self.progress
            .set_resolved_ts(tables_resolved_ts.min(ddl_resolved_ts));

        gauge!(
            CDC_PROCESSOR_RESOLVED_TS,
            CHANGEFEED_ID_LABEL => self.changefeed_id.clone(),
            CAPTURE_ID_LABEL => self.capture_id.clone(),
        )
        .set(self.progress.info().resolved_ts as f64);
    }

    fn advance_checkpoint(&mut self, ts: u64) {
        self.progress.advance_checkpoint_ts(ts);

        gauge!(
            CDC_PROCESSOR_CHECKPOINT_TS,
            CHANGEFEED_ID_LABEL => self.changefeed_id.clone(),
            CAPTURE_ID_LABEL => self.capture_id.clone(),
        )
        .set(self.progress.info().checkpoint_ts as f64);
    }

    async fn persist_with_retry(&mut self) -> CdcResult<()> {
        let max_attempts = self.config.persist_max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match self.progress.persist().await {
                Ok(outcome) => {
                    debug!(?outcome, "persistence tick done");
                    return Ok(());
                }
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(cdc_error!(
                    ErrorKind::RetriesExhausted,
                    "Failed to persist sub changefeed info",
                    format!("gave up after {attempt} attempts"),
                    source: err
                ));
            }

            warn!(attempt, max_attempts, error = %err, "failed to persist sub changefeed info, retrying");

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(PERSIST_RETRY_DELAY) => {}
            }
        }
    }

    async fn final_persist(&mut self) {
        let grace = Duration::from_millis(self.config.final_persist_timeout_ms);

        match timeout(grace, self.progress.persist()).await {
            Ok(Ok(outcome)) => info!(?outcome, info = %self.progress.info(), "final sub changefeed info persisted"),
            Ok(Err(err)) => warn!(error = %err, "final sub changefeed info write failed"),
            Err(_) => warn!(grace_ms = grace.as_millis() as u64, "final sub changefeed info write timed out"),
        }
    }
}
