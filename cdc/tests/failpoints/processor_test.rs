use std::time::Duration;

use cdc::error::ErrorKind;
use cdc::failpoints::{PROCESSOR_GLOBAL_RESOLVED_BEFORE_READ, PROCESSOR_PERSIST_BEFORE_WRITE};
use cdc::schema::memory::MemorySchemaStorage;
use cdc::test_utils::failpoints::CustomFailScenario;
use cdc::test_utils::fixtures::{fast_processor_config, table_infos};
use cdc::test_utils::processor::ProcessorHarness;
use cdc::types::{RawTxn, Span};
use config::shared::ProcessorConfig;
use telemetry::init_test_tracing;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread")]
async fn global_resolved_read_failures_stop_the_processor() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(PROCESSOR_GLOBAL_RESOLVED_BEFORE_READ, "return")]);

    let mut harness = ProcessorHarness::new(MemorySchemaStorage::new());
    harness.assign_tables(table_infos(&[(1, 5)])).await;
    harness.set_global_resolved_ts(10).await;

    let config = ProcessorConfig {
        persist_interval_ms: 60_000,
        ..fast_processor_config()
    };
    let processor = harness.create_processor(config, 5).await.unwrap();
    let handle = processor.start();

    let err = timeout(Duration::from_secs(10), harness.errors_rx.recv())
        .await
        .expect("an error is reported")
        .expect("the error channel is open");
    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);

    assert!(handle.is_cancelled());
    handle.wait().await.unwrap();

    // Nothing was forwarded, but the final write still happened.
    assert!(harness.sink.txns().await.is_empty());
    let stored = harness.stored_info().await.unwrap();
    assert_eq!(stored.checkpoint_ts, 0);
    assert_eq!(
        harness.store.writes(&harness.sub_changefeed_key()).await,
        2
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_write_failures_stop_the_processor() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(PROCESSOR_PERSIST_BEFORE_WRITE, "return")]);

    let mut harness = ProcessorHarness::new(MemorySchemaStorage::new());
    harness.assign_tables(table_infos(&[(1, 5)])).await;
    let key = harness.sub_changefeed_key();

    let processor = harness
        .create_processor(fast_processor_config(), 5)
        .await
        .unwrap();
    let handle = processor.start();

    let err = timeout(Duration::from_secs(10), harness.errors_rx.recv())
        .await
        .expect("an error is reported")
        .expect("the error channel is open");
    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);

    handle.wait().await.unwrap();

    // Only the owner's assignment ever reached the store.
    assert_eq!(harness.store.writes(&key).await, 1);
    assert!(harness.errors_rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_write_failure_is_retried() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(PROCESSOR_PERSIST_BEFORE_WRITE, "1*return")]);

    let mut harness = ProcessorHarness::new(MemorySchemaStorage::new());
    harness.assign_tables(table_infos(&[(1, 5)])).await;
    let key = harness.sub_changefeed_key();

    let processor = harness
        .create_processor(fast_processor_config(), 5)
        .await
        .unwrap();
    let handle = processor.start();

    harness
        .factory
        .push(&Span::table(1), RawTxn::heartbeat(12));
    harness.set_global_resolved_ts(10).await;

    harness.store.wait_for_writes(&key, 2).await;
    handle.shutdown_and_wait().await.unwrap();

    assert!(harness.errors_rx.try_recv().is_err());
    assert!(harness.stored_info().await.is_some());
}
