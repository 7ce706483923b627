use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use config::shared::ProcessorConfig;
use metrics::counter;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, info, warn};

use crate::cdc_error;
use crate::concurrency::group::TaskGroup;
use crate::concurrency::retry::RetryPolicy;
use crate::error::{CdcError, CdcResult, ErrorKind};
use crate::metrics::{
    CAPTURE_ID_LABEL, CDC_PROCESSOR_TXNS_TOTAL, CHANGEFEED_ID_LABEL, STAGE_EXECUTED, STAGE_LABEL,
    STAGE_RECEIVED,
};
use crate::mounter::Mounter;
use crate::processor::progress::SubChangeFeedProgress;
use crate::processor::reporter::ErrorReporter;
use crate::processor::tables::{TableManager, TableStatus};
use crate::processor::workers::global_resolved::GlobalResolvedWorker;
use crate::processor::workers::local_resolved::LocalResolvedWorker;
use crate::processor::workers::sync_resolved::SyncResolvedWorker;
use crate::puller::{PullerFactory, PullerHandle};
use crate::schema::SchemaStorage;
use crate::sink::Sink;
use crate::store::CoordinationStore;
use crate::store::client::CoordinationClient;
use crate::types::{ChangeFeedDetail, Span, SubChangeFeedInfo};

/// The runtime of one changefeed on one capture.
///
/// [`Processor::new`] loads the capture's assignment and starts pulling its tables.
/// [`Processor::start`] then starts the DDL puller and the three workers and returns a
/// [`ProcessorHandle`] to stop and await them.
///
/// Every task derives from a single processor token. A fatal error from any of them is sent
/// once to the host through the error channel and cancels that token. Dropping a processor that
/// was never started cancels the token too, which stops the table pullers.
pub struct Processor<C, P, D> {
    changefeed_id: String,
    capture_id: String,
    config: Arc<ProcessorConfig>,
    detail: ChangeFeedDetail,
    client: CoordinationClient<C>,
    factory: P,
    mounter: Arc<dyn Mounter>,
    schema: Arc<dyn SchemaStorage>,
    sink: D,
    token: CancellationToken,
    cancel_on_drop: DropGuard,
    reporter: ErrorReporter,
    tables: Arc<TableManager<P>>,
    progress: SubChangeFeedProgress<C, P>,
}

impl<C, P, D> Processor<C, P, D>
where
    C: CoordinationStore + Clone + Send + Sync + 'static,
    P: PullerFactory,
    D: Sink + Clone + Send + Sync + 'static,
{
    #[expect(clippy::too_many_arguments)]
    pub async fn new(
        changefeed_id: impl Into<String>,
        capture_id: impl Into<String>,
        config: ProcessorConfig,
        client: CoordinationClient<C>,
        detail: ChangeFeedDetail,
        factory: P,
        mounter: Arc<dyn Mounter>,
        schema: Arc<dyn SchemaStorage>,
        sink: D,
        errors_tx: mpsc::UnboundedSender<CdcError>,
    ) -> CdcResult<Self> {
        config.validate()?;

        let changefeed_id = changefeed_id.into();
        let capture_id = capture_id.into();

        let token = CancellationToken::new();
        let cancel_on_drop = token.clone().drop_guard();
        let reporter = ErrorReporter::with_sender(errors_tx, token.clone());
        let tables = Arc::new(TableManager::new(
            changefeed_id.clone(),
            capture_id.clone(),
            factory.clone(),
            reporter.clone(),
            token.clone(),
            config.table_buffer_size,
        ));

        let (revision, info) = match client
            .get_sub_changefeed_info(&changefeed_id, &capture_id)
            .await?
        {
            Some(stored) => (stored.revision, stored.value),
            None => {
                info!(%changefeed_id, %capture_id, "no sub changefeed info stored yet, starting without tables");
                (0, SubChangeFeedInfo::default())
            }
        };

        let progress = SubChangeFeedProgress::new(
            changefeed_id.clone(),
            capture_id.clone(),
            client.clone(),
            tables.clone(),
            info,
            revision,
        );
        for table in &progress.info().table_infos {
            tables.add_table(table.id, table.start_ts).await;
        }

        info!(%changefeed_id, %capture_id, revision, info = %progress.info(), "processor created");

        Ok(Self {
            changefeed_id,
            capture_id,
            config: Arc::new(config),
            detail,
            client,
            factory,
            mounter,
            schema,
            sink,
            token,
            cancel_on_drop,
            reporter,
            tables,
            progress,
        })
    }

    pub fn changefeed_id(&self) -> &str {
        &self.changefeed_id
    }

    pub fn capture_id(&self) -> &str {
        &self.capture_id
    }

    /// Writes a human readable dump of the processor state.
    pub async fn write_debug_info<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        let statuses = self.tables.statuses().await;
        write_debug_info(w, &self.changefeed_id, &self.detail, self.progress.info(), &statuses)
    }

    /// Starts the DDL puller and the workers.
    pub fn start(self) -> ProcessorHandle<P> {
        let processor_span = tracing::info_span!(
            "processor",
            changefeed_id = %self.changefeed_id,
            capture_id = %self.capture_id
        );
        let _enter = processor_span.enter();

        info!("starting processor");

        let received_counter = self.txn_counter(STAGE_RECEIVED);
        let executed_counter = self.txn_counter(STAGE_EXECUTED);

        // From here on the handle owns the token.
        let _ = self.cancel_on_drop.disarm();

        let progress_rx = self.progress.subscribe();
        let ddl_resolved_ts = Arc::new(AtomicU64::new(self.detail.start_ts));

        let (ddl_tx, ddl_rx) = mpsc::channel(self.config.ddl_channel_size);
        let ddl_reporter = self.reporter.clone();
        let ddl_puller = PullerHandle::spawn(
            &self.factory,
            Span::ddl(),
            self.detail.start_ts,
            ddl_tx,
            &self.token,
            received_counter,
            move |err| ddl_reporter.report(err),
        );

        let (entries_tx, entries_rx) = mpsc::channel(self.config.entry_channel_size);
        let (executed_tx, executed_rx) = mpsc::channel(self.config.entry_channel_size);

        let mut workers = TaskGroup::new("processor_workers", &self.token);
        let workers_token = workers.token().clone();

        let global_resolved = GlobalResolvedWorker::new(
            self.changefeed_id.clone(),
            self.client.clone(),
            self.tables.clone(),
            RetryPolicy::from(&self.config.global_resolved_retry),
            Duration::from_millis(self.config.global_resolved_poll_interval_ms),
            entries_tx,
            workers_token.clone(),
        );
        workers.spawn(
            global_resolved
                .run()
                .instrument(tracing::info_span!("global_resolved_worker")),
        );

        let sync_resolved = SyncResolvedWorker::new(
            self.mounter.clone(),
            self.schema.clone(),
            self.sink.clone(),
            ddl_rx,
            entries_rx,
            executed_tx,
            ddl_resolved_ts.clone(),
            executed_counter,
            workers_token.clone(),
        );
        workers.spawn(
            sync_resolved
                .run()
                .instrument(tracing::info_span!("sync_resolved_worker")),
        );

        let local_resolved = LocalResolvedWorker::new(
            self.changefeed_id.clone(),
            self.capture_id.clone(),
            self.config.clone(),
            self.progress,
            self.tables.clone(),
            ddl_resolved_ts,
            executed_rx,
            workers_token,
        );
        workers.spawn(
            local_resolved
                .run()
                .instrument(tracing::info_span!("local_resolved_worker")),
        );

        let sink = self.sink;
        let reporter = self.reporter;
        let supervisor = tokio::spawn(
            async move {
                let result = workers.wait().await;

                if let Err(err) = sink.shutdown().await {
                    warn!(error = %err, "sink shutdown failed");
                }

                match result {
                    Ok(()) => info!("processor workers stopped"),
                    Err(err) if err.is_cancelled() => info!("processor workers cancelled"),
                    Err(err) => reporter.report(err),
                }
            }
            .instrument(processor_span.clone()),
        );

        ProcessorHandle {
            changefeed_id: self.changefeed_id,
            detail: self.detail,
            token: self.token,
            supervisor,
            ddl_puller,
            tables: self.tables,
            progress_rx,
        }
    }

    fn txn_counter(&self, stage: &'static str) -> metrics::Counter {
        counter!(
            CDC_PROCESSOR_TXNS_TOTAL,
            CHANGEFEED_ID_LABEL => self.changefeed_id.clone(),
            CAPTURE_ID_LABEL => self.capture_id.clone(),
            STAGE_LABEL => stage,
        )
    }
}

/// Handle to a started [`Processor`].
#[derive(Debug)]
pub struct ProcessorHandle<P> {
    changefeed_id: String,
    detail: ChangeFeedDetail,
    token: CancellationToken,
    supervisor: JoinHandle<()>,
    ddl_puller: PullerHandle,
    tables: Arc<TableManager<P>>,
    progress_rx: watch::Receiver<SubChangeFeedInfo>,
}

impl<P> ProcessorHandle<P>
where
    P: PullerFactory,
{
    /// Cancels the processor token. Workers persist progress one last time before stopping.
    pub fn shutdown(&self) {
        info!(changefeed_id = %self.changefeed_id, "shutting down processor");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Follows the in-memory sub-changefeed info as the workers update it.
    pub fn progress(&self) -> watch::Receiver<SubChangeFeedInfo> {
        self.progress_rx.clone()
    }

    pub async fn write_debug_info<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        let statuses = self.tables.statuses().await;
        let info = self.progress_rx.borrow().clone();
        write_debug_info(w, &self.changefeed_id, &self.detail, &info, &statuses)
    }

    /// Waits for the workers to stop, then stops every puller.
    ///
    /// Fatal errors are delivered through the error channel given to [`Processor::new`]. This
    /// only fails if the supervising task itself did not complete.
    pub async fn wait(self) -> CdcResult<()> {
        let result = self.supervisor.await.map_err(|err| {
            if err.is_cancelled() {
                cdc_error!(ErrorKind::Cancelled, "Processor supervisor was aborted", err)
            } else {
                cdc_error!(ErrorKind::WorkerPanic, "Processor supervisor panicked", err)
            }
        });

        // Workers may stop on their own when an input channel closes.
        self.token.cancel();
        self.ddl_puller.wait().await;
        self.tables.shutdown().await;

        info!(changefeed_id = %self.changefeed_id, "processor stopped");

        result
    }

    pub async fn shutdown_and_wait(self) -> CdcResult<()> {
        self.shutdown();
        self.wait().await
    }
}

fn write_debug_info<W: io::Write>(
    w: &mut W,
    changefeed_id: &str,
    detail: &ChangeFeedDetail,
    info: &SubChangeFeedInfo,
    tables: &[TableStatus],
) -> io::Result<()> {
    writeln!(w, "changefeed id: {changefeed_id}, detail: {detail:?}, sub info: {info}")?;
    writeln!(w, "\ttables:")?;
    for table in tables {
        writeln!(
            w,
            "\t\ttable id: {}, start ts: {}, resolved ts: {}",
            table.table_id, table.start_ts, table.resolved_ts
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mounter::kv::KvMounter;
    use crate::schema::memory::MemorySchemaStorage;
    use crate::sink::memory::MemorySink;
    use crate::store::keys::KeySpace;
    use crate::store::memory::MemoryCoordinationStore;
    use crate::test_utils::puller::TestPullerFactory;
    use crate::types::ProcessTableInfo;

    #[tokio::test]
    async fn debug_info_lists_tables() {
        let client = CoordinationClient::new(MemoryCoordinationStore::new(), KeySpace::default());
        client
            .put_sub_changefeed_info(
                "cf",
                "capture",
                &SubChangeFeedInfo {
                    table_infos: vec![
                        ProcessTableInfo { id: 2, start_ts: 9 },
                        ProcessTableInfo { id: 1, start_ts: 4 },
                    ],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let schema = Arc::new(MemorySchemaStorage::new());
        let (errors_tx, _errors_rx) = mpsc::unbounded_channel();
        let processor = Processor::new(
            "cf",
            "capture",
            ProcessorConfig::default(),
            client,
            ChangeFeedDetail::new("memory://", 1),
            TestPullerFactory::new(),
            Arc::new(KvMounter::new(schema.clone())),
            schema,
            MemorySink::new(),
            errors_tx,
        )
        .await
        .unwrap();

        assert_eq!(processor.changefeed_id(), "cf");
        assert_eq!(processor.capture_id(), "capture");

        let mut out = Vec::new();
        processor.write_debug_info(&mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with("changefeed id: cf, detail: "));
        assert!(out.contains("tables: [1, 2]"));
        let table_lines: Vec<_> = out.lines().filter(|line| line.contains("table id")).collect();
        assert_eq!(table_lines.len(), 2);
        assert!(table_lines[0].contains("table id: 1, start ts: 4, resolved ts: 4"));

        processor.start().shutdown_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_an_unstarted_processor_stops_its_pullers() {
        let client = CoordinationClient::new(MemoryCoordinationStore::new(), KeySpace::default());
        client
            .put_sub_changefeed_info(
                "cf",
                "capture",
                &SubChangeFeedInfo {
                    table_infos: vec![ProcessTableInfo { id: 1, start_ts: 4 }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let schema = Arc::new(MemorySchemaStorage::new());
        let (errors_tx, _errors_rx) = mpsc::unbounded_channel();
        let processor = Processor::new(
            "cf",
            "capture",
            ProcessorConfig::default(),
            client,
            ChangeFeedDetail::new("memory://", 1),
            TestPullerFactory::new(),
            Arc::new(KvMounter::new(schema.clone())),
            schema,
            MemorySink::new(),
            errors_tx,
        )
        .await
        .unwrap();

        let token = processor.token.clone();
        let tables = processor.tables.clone();
        assert_eq!(tables.len().await, 1);
        assert!(!token.is_cancelled());

        drop(processor);
        assert!(token.is_cancelled());

        tokio::time::timeout(Duration::from_secs(5), tables.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let client = CoordinationClient::new(MemoryCoordinationStore::new(), KeySpace::default());
        let schema = Arc::new(MemorySchemaStorage::new());
        let (errors_tx, _errors_rx) = mpsc::unbounded_channel();

        let result = Processor::new(
            "cf",
            "capture",
            ProcessorConfig {
                entry_channel_size: 0,
                ..ProcessorConfig::default()
            },
            client,
            ChangeFeedDetail::new("memory://", 1),
            TestPullerFactory::new(),
            Arc::new(KvMounter::new(schema.clone())),
            schema,
            MemorySink::new(),
            errors_tx,
        )
        .await;

        let Err(err) = result else {
            panic!("expected an invalid configuration");
        };
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
