use std::future::Future;

use crate::error::CdcResult;
use crate::types::Txn;

/// Trait for systems that durably deliver mounted transactions downstream.
///
/// [`Sink::emit`] is called from a single task with non-decreasing transaction timestamps. The
/// processor only advances its checkpoint past a timestamp once every transaction up to it was
/// emitted, so implementations must not acknowledge a transaction before it is durable.
///
/// Delivery is at least once: after a restart, transactions between the last persisted checkpoint
/// and the failure point are emitted again.
pub trait Sink {
    /// Returns the name of the sink.
    fn name() -> &'static str;

    /// Propagates the shutdown signal to the sink.
    ///
    /// The default implementation is a no-op.
    fn shutdown(&self) -> impl Future<Output = CdcResult<()>> + Send {
        async { Ok(()) }
    }

    /// Delivers one transaction.
    fn emit(&self, txn: Txn) -> impl Future<Output = CdcResult<()>> + Send;
}
