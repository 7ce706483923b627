use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::CdcResult;
use crate::puller::RawTxnCollector;
use crate::types::{Span, Ts};

/// Streams raw transactions of a span.
///
/// [`Puller::run`] and [`Puller::collect_raw_txns`] are driven concurrently under the same
/// token. Both return `Ok(())` once the token is cancelled.
pub trait Puller: Send + Sync + 'static {
    /// Runs the pulling loop until `cancel` fires or a fatal error occurs.
    fn run(&self, cancel: CancellationToken) -> impl Future<Output = CdcResult<()>> + Send;

    /// Hands every assembled transaction to `collector`, in commit order.
    ///
    /// An error returned by the collector ends the collection with that error.
    fn collect_raw_txns(
        &self,
        cancel: CancellationToken,
        collector: RawTxnCollector,
    ) -> impl Future<Output = CdcResult<()>> + Send;
}

/// Creates pullers bound to a span and a start timestamp.
pub trait PullerFactory: Clone + Send + Sync + 'static {
    type Puller: Puller;

    fn create(&self, span: Span, start_ts: Ts) -> Self::Puller;
}
