use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug};

use crate::cdc_error;
use crate::error::{CdcError, CdcResult, ErrorKind};

/// A set of tasks sharing one cancellation scope.
///
/// The scope is a child of the token the group is created from, so cancelling the parent stops
/// every task while a failure inside the group only stops its siblings. The first error
/// returned by any task cancels the scope and leads the error [`TaskGroup::wait`] returns.
///
/// Dropping the group aborts every task still running.
#[derive(Debug)]
pub struct TaskGroup {
    name: &'static str,
    token: CancellationToken,
    join_set: JoinSet<CdcResult<()>>,
}

impl TaskGroup {
    pub fn new(name: &'static str, parent: &CancellationToken) -> Self {
        Self {
            name,
            token: parent.child_token(),
            join_set: JoinSet::new(),
        }
    }

    /// Token cancelled when the group fails or its parent is cancelled.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = CdcResult<()>> + Send + 'static,
    {
        self.join_set.spawn(future.in_current_span());
    }

    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    /// Waits for every task.
    ///
    /// The first failure cancels the group. Every failure is returned, aggregated in completion
    /// order, and cancellations are left out unless nothing else failed. A panicking task is
    /// reported as [`ErrorKind::WorkerPanic`].
    pub async fn wait(mut self) -> CdcResult<()> {
        let mut errors: Vec<CdcError> = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            let result = match result {
                Ok(result) => result,
                Err(join_err) if join_err.is_cancelled() => Err(cdc_error!(
                    ErrorKind::Cancelled,
                    "Task was aborted",
                    self.name
                )),
                Err(join_err) => Err(cdc_error!(
                    ErrorKind::WorkerPanic,
                    "Task panicked",
                    format!("{}: {join_err}", self.name)
                )),
            };

            let Err(err) = result else {
                continue;
            };

            if errors.is_empty() {
                self.token.cancel();
            } else {
                debug!(group = self.name, error = %err, "another task of the group failed");
            }
            errors.push(err);
        }

        if errors.iter().any(|err| !err.is_cancelled()) {
            errors.retain(|err| !err.is_cancelled());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn panicking_task() -> CdcResult<()> {
        panic!("boom")
    }

    #[tokio::test]
    async fn first_error_cancels_siblings() {
        let parent = CancellationToken::new();
        let mut group = TaskGroup::new("test", &parent);

        let token = group.token().clone();
        group.spawn(async move {
            token.cancelled().await;
            Ok(())
        });
        group.spawn(async move { Err(cdc_error!(ErrorKind::PullerFailed, "Puller failed")) });

        let err = group.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PullerFailed);
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn every_failure_is_returned() {
        let parent = CancellationToken::new();
        let mut group = TaskGroup::new("test", &parent);

        group.spawn(async move { Err(cdc_error!(ErrorKind::PullerFailed, "Puller failed")) });

        // Fails only once the first failure cancelled the group.
        let token = group.token().clone();
        group.spawn(async move {
            token.cancelled().await;
            Err(cdc_error!(ErrorKind::SinkDeliveryFailed, "Sink failed"))
        });

        // Stopped by the cancellation, which is not a failure of its own.
        let token = group.token().clone();
        group.spawn(async move {
            token.cancelled().await;
            Err(cdc_error!(ErrorKind::Cancelled, "Stopped"))
        });

        let err = group.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PullerFailed);
        assert_eq!(err.kinds().len(), 2);
        assert!(err.kinds().contains(&ErrorKind::SinkDeliveryFailed));
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn only_cancellations_stay_cancelled() {
        let parent = CancellationToken::new();
        let mut group = TaskGroup::new("test", &parent);

        for _ in 0..2 {
            let token = group.token().clone();
            group.spawn(async move {
                token.cancelled().await;
                Err(cdc_error!(ErrorKind::Cancelled, "Stopped"))
            });
        }

        parent.cancel();
        let err = group.wait().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.kinds(), vec![ErrorKind::Cancelled, ErrorKind::Cancelled]);
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_tasks() {
        let parent = CancellationToken::new();
        let mut group = TaskGroup::new("test", &parent);

        let token = group.token().clone();
        group.spawn(async move {
            token.cancelled().await;
            Ok(())
        });

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(5), group.wait())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn panic_is_reported_as_worker_panic() {
        let parent = CancellationToken::new();
        let mut group = TaskGroup::new("test", &parent);
        group.spawn(panicking_task());

        let err = group.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorkerPanic);
    }

    #[tokio::test]
    async fn empty_group_succeeds() {
        let group = TaskGroup::new("test", &CancellationToken::new());
        assert!(group.is_empty());
        group.wait().await.unwrap();
    }
}
