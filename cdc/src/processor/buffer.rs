use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error};

use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};
use crate::types::{ProcessorEntry, RawTxn, TableId, Ts};

#[derive(Debug)]
struct BufferState {
    rx: mpsc::Receiver<RawTxn>,
    /// First transaction observed beyond the last boundary, replayed by the next forward.
    put_back: Option<RawTxn>,
}

impl BufferState {
    fn put_back(&mut self, table_id: TableId, txn: RawTxn) {
        if let Some(held) = &self.put_back {
            error!(
                table_id,
                held_ts = held.ts,
                ts = txn.ts,
                "table stream buffer already holds a put back transaction, aborting"
            );
            std::process::abort();
        }

        self.put_back = Some(txn);
    }
}

/// Per-table buffer releasing raw transactions up to a boundary timestamp.
///
/// A relay task reads the table puller's channel, reports every observed timestamp and
/// republishes the transaction on an internal channel, so the puller keeps making progress
/// while [`TableStreamBuffer::forward`] waits for the global resolved timestamp to move.
#[derive(Debug)]
pub struct TableStreamBuffer {
    table_id: TableId,
    state: Mutex<BufferState>,
}

impl TableStreamBuffer {
    /// Starts the relay over `input` and returns the buffer with the relay's handle.
    ///
    /// The relay stops when `input` closes, when `cancel` fires or when the buffer is dropped.
    /// In every case the internal channel is closed, which ends any pending forward.
    pub fn start<F>(
        table_id: TableId,
        mut input: mpsc::Receiver<RawTxn>,
        capacity: usize,
        cancel: CancellationToken,
        on_observed: F,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        F: Fn(Ts) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let relay_span = tracing::debug_span!("table_stream_relay", table_id);
        let relay = async move {
            loop {
                let txn = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    txn = input.recv() => match txn {
                        Some(txn) => txn,
                        None => break,
                    },
                };

                on_observed(txn.ts);

                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    result = tx.send(txn) => {
                        if result.is_err() {
                            break;
                        }
                    }
                }
            }

            debug!("table stream relay stopped");
        }
        .instrument(relay_span);

        let buffer = Arc::new(Self {
            table_id,
            state: Mutex::new(BufferState { rx, put_back: None }),
        });

        (buffer, tokio::spawn(relay))
    }

    /// Sends every buffered transaction with `ts <= boundary` to `output`, in arrival order.
    ///
    /// Stops at the end of the stream or at the first transaction beyond `boundary`, which is
    /// kept for the next call. Fails with [`ErrorKind::Cancelled`] if `cancel` fires or the
    /// receiver of `output` is gone.
    pub async fn forward(
        &self,
        boundary: Ts,
        output: &mpsc::Sender<ProcessorEntry>,
        cancel: &CancellationToken,
    ) -> CdcResult<()> {
        let mut state = self.state.lock().await;

        if let Some(txn) = state.put_back.take() {
            if txn.ts > boundary {
                state.put_back = Some(txn);
                return Ok(());
            }

            self.send(txn, output, cancel).await?;
        }

        loop {
            let txn = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Err(cdc_error!(
                        ErrorKind::Cancelled,
                        "Table forward cancelled",
                        self.table_id
                    ));
                }
                txn = state.rx.recv() => match txn {
                    Some(txn) => txn,
                    None => return Ok(()),
                },
            };

            if txn.ts > boundary {
                state.put_back(self.table_id, txn);
                return Ok(());
            }

            self.send(txn, output, cancel).await?;
        }
    }

    async fn send(
        &self,
        txn: RawTxn,
        output: &mpsc::Sender<ProcessorEntry>,
        cancel: &CancellationToken,
    ) -> CdcResult<()> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(cdc_error!(
                ErrorKind::Cancelled,
                "Table forward cancelled",
                self.table_id
            )),
            result = output.send(ProcessorEntry::Dml(txn)) => result.map_err(|_| {
                cdc_error!(
                    ErrorKind::Cancelled,
                    "Ordered entries receiver dropped",
                    self.table_id
                )
            }),
        }
    }
}
