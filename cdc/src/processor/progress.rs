use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::CdcResult;
use crate::failpoints::{PROCESSOR_PERSIST_BEFORE_WRITE, cdc_fail_point};
use crate::processor::reconcile::{TableDiff, diff_process_table_infos};
use crate::processor::tables::TableManager;
use crate::puller::PullerFactory;
use crate::store::client::CoordinationClient;
use crate::store::{CasOutcome, CoordinationStore, Revision};
use crate::types::{SubChangeFeedInfo, Ts};

/// Result of one persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The in-memory record was written.
    Written { revision: Revision },
    /// The stored record had changed. It was read back and the live tables reconciled with it;
    /// the merged record is written by the next attempt.
    Reconciled { revision: Revision, diff: TableDiff },
}

/// The processor's in-memory [`SubChangeFeedInfo`] and the revision it was last synced at.
///
/// Every change is published on a [`watch`] channel so that hosts can follow progress.
#[derive(Debug)]
pub struct SubChangeFeedProgress<C, P> {
    changefeed_id: String,
    capture_id: String,
    client: CoordinationClient<C>,
    tables: Arc<TableManager<P>>,
    info: SubChangeFeedInfo,
    revision: Revision,
    publisher: watch::Sender<SubChangeFeedInfo>,
}

impl<C, P> SubChangeFeedProgress<C, P>
where
    C: CoordinationStore,
    P: PullerFactory,
{
    pub fn new(
        changefeed_id: String,
        capture_id: String,
        client: CoordinationClient<C>,
        tables: Arc<TableManager<P>>,
        mut info: SubChangeFeedInfo,
        revision: Revision,
    ) -> Self {
        info.sort_table_infos();
        let (publisher, _) = watch::channel(info.clone());

        Self {
            changefeed_id,
            capture_id,
            client,
            tables,
            info,
            revision,
            publisher,
        }
    }

    pub fn info(&self) -> &SubChangeFeedInfo {
        &self.info
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn subscribe(&self) -> watch::Receiver<SubChangeFeedInfo> {
        self.publisher.subscribe()
    }

    pub fn set_resolved_ts(&mut self, candidate: Ts) {
        self.info.set_resolved_ts(candidate);
        self.publish();
    }

    pub fn advance_checkpoint_ts(&mut self, ts: Ts) {
        self.info.advance_checkpoint_ts(ts);
        self.publish();
    }

    /// Writes the in-memory record if the stored one is still at the last synced revision.
    ///
    /// A conflict is not an error: the stored record is read back and reconciled instead.
    pub async fn persist(&mut self) -> CdcResult<PersistOutcome> {
        cdc_fail_point(PROCESSOR_PERSIST_BEFORE_WRITE)?;

        let outcome = self
            .client
            .compare_and_put_sub_changefeed_info(
                &self.changefeed_id,
                &self.capture_id,
                &self.info,
                self.revision,
            )
            .await?;

        match outcome {
            CasOutcome::Written { revision } => {
                self.revision = revision;
                debug!(revision, info = %self.info, "sub changefeed info persisted");

                Ok(PersistOutcome::Written { revision })
            }
            CasOutcome::Conflict { current } => {
                info!(
                    expected = self.revision,
                    current, "sub changefeed info changed concurrently, reconciling"
                );
                let diff = self.reconcile().await?;

                Ok(PersistOutcome::Reconciled {
                    revision: self.revision,
                    diff,
                })
            }
        }
    }

    /// Adopts the stored record, restarting tables whose assignment changed.
    ///
    /// Watermarks never move backwards, and a pending pause request is acknowledged with the
    /// checkpoint known before the re-read.
    async fn reconcile(&mut self) -> CdcResult<TableDiff> {
        let stored = self
            .client
            .get_sub_changefeed_info(&self.changefeed_id, &self.capture_id)
            .await?;

        let (revision, mut latest) = match stored {
            Some(stored) => (stored.revision, stored.value),
            None => {
                warn!("sub changefeed info was deleted, treating the assignment as empty");
                (0, SubChangeFeedInfo::default())
            }
        };
        latest.sort_table_infos();

        let diff = diff_process_table_infos(&self.info.table_infos, &latest.table_infos);
        self.tables.apply_diff(&diff).await;

        let checkpoint_ts = self.info.checkpoint_ts;
        latest.advance_checkpoint_ts(checkpoint_ts);
        latest.set_resolved_ts(latest.resolved_ts.max(self.info.resolved_ts));
        if latest.acknowledge_pause(checkpoint_ts) {
            info!(checkpoint_ts, "table pause request acknowledged");
        }

        self.info = latest;
        self.revision = revision;
        self.publish();

        info!(
            revision,
            removed = ?diff.removed,
            added = ?diff.added,
            info = %self.info,
            "sub changefeed info reconciled"
        );

        Ok(diff)
    }

    fn publish(&self) {
        self.publisher.send_replace(self.info.clone());
    }
}
