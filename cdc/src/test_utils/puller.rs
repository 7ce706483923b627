use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::puller::{Puller, PullerFactory, RawTxnCollector};
use crate::types::{RawTxn, Span, Ts};

#[derive(Debug)]
struct Feed {
    tx: mpsc::UnboundedSender<RawTxn>,
    rx: Option<mpsc::UnboundedReceiver<RawTxn>>,
}

impl Feed {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

#[derive(Debug, Default)]
struct Inner {
    feeds: HashMap<Span, Feed>,
    created: Vec<(Span, Ts)>,
    failures: HashMap<Span, String>,
}

/// Puller factory whose streams are fed by the test through [`TestPullerFactory::push`].
///
/// Every span has a feed. Transactions pushed before a puller exists for the span are delivered
/// once it is created. A puller created again for the same span gets a fresh feed, so
/// transactions pushed afterwards reach the newest puller.
#[derive(Debug, Clone, Default)]
pub struct TestPullerFactory {
    inner: Arc<Mutex<Inner>>,
}

impl TestPullerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `txn` on the stream of `span`.
    pub fn push(&self, span: &Span, txn: RawTxn) {
        let mut inner = self.lock();
        let feed = inner.feeds.entry(span.clone()).or_insert_with(Feed::new);

        if let Err(mpsc::error::SendError(txn)) = feed.tx.send(txn) {
            // The last puller of this span is gone, keep the transaction for the next one.
            let fresh = Feed::new();
            let _ = fresh.tx.send(txn);
            *feed = fresh;
        }
    }

    /// Makes the next puller created for `span` fail as soon as it runs.
    pub fn fail_next(&self, span: &Span, message: &str) {
        self.lock()
            .failures
            .insert(span.clone(), message.to_string());
    }

    /// Start timestamps of the pullers created for `span`.
    pub fn created_for(&self, span: &Span) -> Vec<Ts> {
        self.lock()
            .created
            .iter()
            .filter(|(created, _)| created == span)
            .map(|(_, start_ts)| *start_ts)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PullerFactory for TestPullerFactory {
    type Puller = TestPuller;

    fn create(&self, span: Span, start_ts: Ts) -> Self::Puller {
        let mut inner = self.lock();
        inner.created.push((span.clone(), start_ts));

        let feed = inner.feeds.entry(span.clone()).or_insert_with(Feed::new);
        if feed.rx.is_none() {
            *feed = Feed::new();
        }
        let rx = feed.rx.take();

        let failure = inner.failures.remove(&span);

        TestPuller {
            span,
            rx: AsyncMutex::new(rx),
            failure,
        }
    }
}

/// Puller created by [`TestPullerFactory`].
#[derive(Debug)]
pub struct TestPuller {
    span: Span,
    rx: AsyncMutex<Option<mpsc::UnboundedReceiver<RawTxn>>>,
    failure: Option<String>,
}

impl Puller for TestPuller {
    async fn run(&self, cancel: CancellationToken) -> CdcResult<()> {
        if let Some(message) = &self.failure {
            bail!(ErrorKind::PullerFailed, "Test puller failed", message);
        }

        cancel.cancelled().await;

        Ok(())
    }

    async fn collect_raw_txns(
        &self,
        cancel: CancellationToken,
        collector: RawTxnCollector,
    ) -> CdcResult<()> {
        let Some(mut rx) = self.rx.lock().await.take() else {
            cancel.cancelled().await;
            return Ok(());
        };

        loop {
            let txn = tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(()),
                txn = rx.recv() => txn,
            };

            let Some(txn) = txn else {
                cancel.cancelled().await;
                return Ok(());
            };

            match collector.collect(txn).await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {
                    debug!(span = %self.span, "test puller collection stopped");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }
}
