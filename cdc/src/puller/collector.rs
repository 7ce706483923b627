use std::fmt;

use metrics::Counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};
use crate::types::{RawTxn, Span};

/// Sink side of a puller, forwarding raw transactions into a bounded channel.
///
/// Dropping the collector closes the channel, which signals end of stream to the reader.
pub struct RawTxnCollector {
    span: Span,
    tx: mpsc::Sender<RawTxn>,
    cancel: CancellationToken,
    received: Counter,
}

impl fmt::Debug for RawTxnCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTxnCollector")
            .field("span", &self.span)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl RawTxnCollector {
    pub fn new(
        span: Span,
        tx: mpsc::Sender<RawTxn>,
        cancel: CancellationToken,
        received: Counter,
    ) -> Self {
        Self {
            span,
            tx,
            cancel,
            received,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Forwards `txn`, waiting for channel capacity.
    ///
    /// Fails with [`ErrorKind::Cancelled`] when the token fires or the reader is gone.
    pub async fn collect(&self, txn: RawTxn) -> CdcResult<()> {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(cdc_error!(
                ErrorKind::Cancelled,
                "Raw transaction collection cancelled",
                self.span
            )),
            result = self.tx.send(txn) => {
                if result.is_err() {
                    return Err(cdc_error!(
                        ErrorKind::Cancelled,
                        "Raw transaction receiver dropped",
                        self.span
                    ));
                }

                self.received.increment(1);
                Ok(())
            }
        }
    }
}
