use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::{
    CAPTURE_ID_LABEL, CDC_PROCESSOR_TABLE_COUNT, CDC_PROCESSOR_TXNS_TOTAL, CHANGEFEED_ID_LABEL,
    STAGE_LABEL, STAGE_RECEIVED,
};
use crate::processor::buffer::TableStreamBuffer;
use crate::processor::reconcile::TableDiff;
use crate::processor::reporter::ErrorReporter;
use crate::puller::{PullerFactory, PullerHandle};
use crate::types::{Span, TableId, Ts};

/// A live table: its puller, its stream buffer and the highest timestamp it has produced.
#[derive(Debug)]
struct TableInfo {
    start_ts: Ts,
    resolved_ts: Arc<AtomicU64>,
    buffer: Arc<TableStreamBuffer>,
    puller: PullerHandle,
    relay_task: JoinHandle<()>,
}

/// Point-in-time view of one live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStatus {
    pub table_id: TableId,
    pub start_ts: Ts,
    pub resolved_ts: Ts,
}

/// The set of tables a processor is pulling, guarded by a single mutex.
///
/// Every table runs its puller under its own child token of the processor token. A puller
/// failure other than cancellation is handed to the [`ErrorReporter`].
#[derive(Debug)]
pub struct TableManager<P> {
    changefeed_id: String,
    capture_id: String,
    factory: P,
    reporter: ErrorReporter,
    token: CancellationToken,
    buffer_size: usize,
    tables: Mutex<HashMap<TableId, TableInfo>>,
}

impl<P> TableManager<P>
where
    P: PullerFactory,
{
    pub fn new(
        changefeed_id: String,
        capture_id: String,
        factory: P,
        reporter: ErrorReporter,
        token: CancellationToken,
        buffer_size: usize,
    ) -> Self {
        Self {
            changefeed_id,
            capture_id,
            factory,
            reporter,
            token,
            buffer_size,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Starts pulling `table_id` from `start_ts`. Adding a live table only logs a warning.
    pub async fn add_table(&self, table_id: TableId, start_ts: Ts) {
        let mut tables = self.tables.lock().await;
        self.add_locked(&mut tables, table_id, start_ts);
        self.report_table_count(tables.len());
    }

    /// Cancels the puller of `table_id` and forgets the table.
    ///
    /// Returns `false` if the table was not live.
    pub async fn remove_table(&self, table_id: TableId) -> bool {
        let mut tables = self.tables.lock().await;
        let removed = self.remove_locked(&mut tables, table_id);
        self.report_table_count(tables.len());

        removed
    }

    /// Applies an assignment change under one lock: removals first, then additions.
    pub async fn apply_diff(&self, diff: &TableDiff) {
        let mut tables = self.tables.lock().await;

        for table in &diff.removed {
            self.remove_locked(&mut tables, table.id);
        }
        for table in &diff.added {
            self.add_locked(&mut tables, table.id, table.start_ts);
        }

        self.report_table_count(tables.len());
    }

    /// Returns the buffers of every live table. The lock is released before returning.
    pub async fn buffers(&self) -> Vec<Arc<TableStreamBuffer>> {
        let tables = self.tables.lock().await;
        tables.values().map(|table| table.buffer.clone()).collect()
    }

    /// Returns the minimum resolved timestamp over live tables, `None` when there are none.
    pub async fn min_resolved_ts(&self) -> Option<Ts> {
        let tables = self.tables.lock().await;
        tables
            .values()
            .map(|table| table.resolved_ts.load(Ordering::Acquire))
            .min()
    }

    /// Returns the status of every live table, sorted by table id.
    pub async fn statuses(&self) -> Vec<TableStatus> {
        let tables = self.tables.lock().await;
        let mut statuses: Vec<_> = tables
            .iter()
            .map(|(table_id, table)| TableStatus {
                table_id: *table_id,
                start_ts: table.start_ts,
                resolved_ts: table.resolved_ts.load(Ordering::Acquire),
            })
            .collect();
        statuses.sort_by_key(|status| status.table_id);

        statuses
    }

    pub async fn len(&self) -> usize {
        self.tables.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.lock().await.is_empty()
    }

    /// Cancels every table and waits for their tasks to stop.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut tables = self.tables.lock().await;
            let drained = tables.drain().collect();
            self.report_table_count(0);
            drained
        };

        for (table_id, table) in drained {
            table.puller.cancel();
            table.puller.wait().await;

            if let Err(err) = table.relay_task.await {
                warn!(table_id, error = %err, "table relay task did not stop cleanly");
            }
        }
    }

    fn add_locked(&self, tables: &mut HashMap<TableId, TableInfo>, table_id: TableId, start_ts: Ts) {
        if tables.contains_key(&table_id) {
            warn!(table_id, "table is already being pulled, ignoring add");
            return;
        }

        let (tx, rx) = mpsc::channel(self.buffer_size.max(1));
        let received = counter!(
            CDC_PROCESSOR_TXNS_TOTAL,
            CHANGEFEED_ID_LABEL => self.changefeed_id.clone(),
            CAPTURE_ID_LABEL => self.capture_id.clone(),
            STAGE_LABEL => STAGE_RECEIVED,
        );
        let reporter = self.reporter.clone();
        let puller = PullerHandle::spawn(
            &self.factory,
            Span::table(table_id),
            start_ts,
            tx,
            &self.token,
            received,
            move |err| reporter.report(err),
        );

        let resolved_ts = Arc::new(AtomicU64::new(start_ts));
        let observed = resolved_ts.clone();
        let (buffer, relay_task) = TableStreamBuffer::start(
            table_id,
            rx,
            self.buffer_size,
            puller.token().clone(),
            move |ts| {
                observed.fetch_max(ts, Ordering::AcqRel);
            },
        );

        tables.insert(
            table_id,
            TableInfo {
                start_ts,
                resolved_ts,
                buffer,
                puller,
                relay_task,
            },
        );

        info!(table_id, start_ts, "table added");
    }

    fn remove_locked(&self, tables: &mut HashMap<TableId, TableInfo>, table_id: TableId) -> bool {
        let Some(table) = tables.remove(&table_id) else {
            warn!(table_id, "table is not being pulled, ignoring remove");
            return false;
        };

        table.puller.cancel();
        info!(table_id, "table removed");

        true
    }

    fn report_table_count(&self, count: usize) {
        gauge!(
            CDC_PROCESSOR_TABLE_COUNT,
            CHANGEFEED_ID_LABEL => self.changefeed_id.clone(),
            CAPTURE_ID_LABEL => self.capture_id.clone(),
        )
        .set(count as f64);
    }
}
