use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::CdcError;

/// Forwards fatal processor errors to the hosting capture.
///
/// Reporting an error also cancels the processor token, which is how every other task of the
/// processor learns it has to stop.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::UnboundedSender<CdcError>,
    token: CancellationToken,
}

impl ErrorReporter {
    /// Creates a reporter cancelling `token`, and the receiver owned by the host.
    pub fn new(token: CancellationToken) -> (Self, mpsc::UnboundedReceiver<CdcError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sender(tx, token), rx)
    }

    pub fn with_sender(tx: mpsc::UnboundedSender<CdcError>, token: CancellationToken) -> Self {
        Self { tx, token }
    }

    pub fn report(&self, err: CdcError) {
        error!(error = %err, "processor failed");

        self.token.cancel();
        if self.tx.send(err).is_err() {
            error!("processor error receiver dropped, error was only logged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc_error;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn report_sends_and_cancels() {
        let token = CancellationToken::new();
        let (reporter, mut errors) = ErrorReporter::new(token.clone());

        reporter.report(cdc_error!(ErrorKind::SinkDeliveryFailed, "Sink failed"));

        assert!(token.is_cancelled());
        assert_eq!(
            errors.recv().await.unwrap().kind(),
            ErrorKind::SinkDeliveryFailed
        );
    }
}
