use std::sync::Arc;
use std::time::Duration;

use config::shared::ProcessorConfig;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use crate::error::{CdcError, CdcResult};
use crate::mounter::kv::KvMounter;
use crate::processor::Processor;
use crate::schema::memory::MemorySchemaStorage;
use crate::sink::memory::MemorySink;
use crate::store::Revision;
use crate::store::client::CoordinationClient;
use crate::store::keys::KeySpace;
use crate::test_utils::notify::DEFAULT_NOTIFY_TIMEOUT;
use crate::test_utils::puller::TestPullerFactory;
use crate::test_utils::store::RecordingCoordinationStore;
use crate::types::{ChangeFeedDetail, ChangeFeedStatus, ProcessTableInfo, SubChangeFeedInfo, Ts};

pub const TEST_CHANGEFEED_ID: &str = "test-changefeed";
pub const TEST_CAPTURE_ID: &str = "test-capture";

pub type TestProcessor = Processor<RecordingCoordinationStore, TestPullerFactory, MemorySink>;

/// In-memory collaborators of one processor, shared with the test driving it.
#[derive(Debug)]
pub struct ProcessorHarness {
    pub store: RecordingCoordinationStore,
    pub client: CoordinationClient<RecordingCoordinationStore>,
    pub factory: TestPullerFactory,
    pub schema: Arc<MemorySchemaStorage>,
    pub sink: MemorySink,
    pub errors_rx: mpsc::UnboundedReceiver<CdcError>,
    errors_tx: mpsc::UnboundedSender<CdcError>,
}

impl ProcessorHarness {
    pub fn new(schema: MemorySchemaStorage) -> Self {
        let store = RecordingCoordinationStore::new();
        let client = CoordinationClient::new(store.clone(), KeySpace::default());
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        Self {
            store,
            client,
            factory: TestPullerFactory::new(),
            schema: Arc::new(schema),
            sink: MemorySink::new(),
            errors_rx,
            errors_tx,
        }
    }

    pub fn sub_changefeed_key(&self) -> String {
        self.client
            .keys()
            .sub_changefeed(TEST_CHANGEFEED_ID, TEST_CAPTURE_ID)
    }

    /// Writes the capture's assignment the way the owner does.
    pub async fn assign(&self, info: &SubChangeFeedInfo) -> Revision {
        self.client
            .put_sub_changefeed_info(TEST_CHANGEFEED_ID, TEST_CAPTURE_ID, info)
            .await
            .unwrap()
    }

    pub async fn assign_tables(&self, tables: Vec<ProcessTableInfo>) -> Revision {
        self.assign(&SubChangeFeedInfo {
            table_infos: tables,
            ..Default::default()
        })
        .await
    }

    pub async fn set_global_resolved_ts(&self, resolved_ts: Ts) {
        self.client
            .put_changefeed_status(
                TEST_CHANGEFEED_ID,
                &ChangeFeedStatus {
                    resolved_ts,
                    checkpoint_ts: 0,
                },
            )
            .await
            .unwrap();
    }

    pub async fn stored_info(&self) -> Option<SubChangeFeedInfo> {
        self.client
            .get_sub_changefeed_info(TEST_CHANGEFEED_ID, TEST_CAPTURE_ID)
            .await
            .unwrap()
            .map(|stored| stored.value)
    }

    pub async fn create_processor(
        &self,
        config: ProcessorConfig,
        start_ts: Ts,
    ) -> CdcResult<TestProcessor> {
        Processor::new(
            TEST_CHANGEFEED_ID,
            TEST_CAPTURE_ID,
            config,
            self.client.clone(),
            ChangeFeedDetail::new("memory://", start_ts),
            self.factory.clone(),
            Arc::new(KvMounter::new(self.schema.clone())),
            self.schema.clone(),
            self.sink.clone(),
            self.errors_tx.clone(),
        )
        .await
    }
}

/// Waits until the published progress satisfies `condition` and returns it.
///
/// # Panics
///
/// Panics if that does not happen within [`DEFAULT_NOTIFY_TIMEOUT`].
pub async fn wait_for_progress<F>(
    progress: &mut watch::Receiver<SubChangeFeedInfo>,
    condition: F,
) -> SubChangeFeedInfo
where
    F: Fn(&SubChangeFeedInfo) -> bool,
{
    let wait = async {
        loop {
            {
                let info = progress.borrow_and_update();
                if condition(&info) {
                    return info.clone();
                }
            }

            if progress.changed().await.is_err() {
                panic!("progress publisher dropped before the condition was met");
            }
        }
    };

    match timeout(DEFAULT_NOTIFY_TIMEOUT, wait).await {
        Ok(info) => info,
        Err(_) => panic!("progress condition not met within {DEFAULT_NOTIFY_TIMEOUT:?}"),
    }
}

/// Polls `condition` until it holds.
///
/// # Panics
///
/// Panics if that does not happen within [`DEFAULT_NOTIFY_TIMEOUT`].
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let wait = async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    if timeout(DEFAULT_NOTIFY_TIMEOUT, wait).await.is_err() {
        panic!("condition not met within {DEFAULT_NOTIFY_TIMEOUT:?}");
    }
}
