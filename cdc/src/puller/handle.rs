use std::sync::Arc;

use metrics::Counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

use crate::concurrency::group::TaskGroup;
use crate::error::CdcError;
use crate::puller::{Puller, PullerFactory, RawTxnCollector};
use crate::types::{RawTxn, Span, Ts};

/// A running puller: its run loop and its collection loop, joined in one [`TaskGroup`].
///
/// Both loops share a child token of the parent they were spawned under. An error from either
/// stops the other, and is handed to the error callback unless it is a cancellation.
#[derive(Debug)]
pub struct PullerHandle {
    span: Span,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PullerHandle {
    /// Creates a puller for `span` from `start_ts` and starts streaming into `tx`.
    pub fn spawn<P, F>(
        factory: &P,
        span: Span,
        start_ts: Ts,
        tx: mpsc::Sender<RawTxn>,
        parent: &CancellationToken,
        received: Counter,
        on_error: F,
    ) -> Self
    where
        P: PullerFactory,
        F: FnOnce(CdcError) + Send + 'static,
    {
        let mut group = TaskGroup::new("puller", parent);
        let token = group.token().clone();

        let collector = RawTxnCollector::new(span.clone(), tx, token.clone(), received);
        let puller = Arc::new(factory.create(span.clone(), start_ts));

        let run_puller = puller.clone();
        let run_token = token.clone();
        group.spawn(async move { run_puller.run(run_token).await });

        let collect_token = token.clone();
        group.spawn(async move { puller.collect_raw_txns(collect_token, collector).await });

        let puller_span = tracing::info_span!("puller", %span, start_ts);
        let task = tokio::spawn(
            async move {
                match group.wait().await {
                    Ok(()) => debug!("puller stopped"),
                    Err(err) if err.is_cancelled() => debug!("puller cancelled"),
                    Err(err) => on_error(err),
                }
            }
            .instrument(puller_span),
        );

        Self { span, token, task }
    }

    /// Token shared by the puller's loops.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for both loops to stop, without cancelling them.
    pub async fn wait(self) {
        if let Err(err) = self.task.await {
            warn!(span = %self.span, error = %err, "puller task did not stop cleanly");
        }
    }
}
