use std::time::Duration;

use cdc::error::ErrorKind;
use cdc::schema::memory::MemorySchemaStorage;
use cdc::test_utils::fixtures::{
    create_table_job, ddl_raw_txn, fast_processor_config, rename_table_job, row_raw_txn,
    table_infos,
};
use cdc::test_utils::processor::{ProcessorHarness, wait_for_progress, wait_until};
use cdc::types::{RawTxn, Span, Txn};
use config::shared::ProcessorConfig;
use telemetry::init_test_tracing;
use tokio::time::timeout;

const USERS_TABLE_ID: i64 = 1;

fn users_schema() -> MemorySchemaStorage {
    MemorySchemaStorage::from_history(vec![create_table_job(1, 1, USERS_TABLE_ID, "users")])
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_are_released_up_to_the_global_resolved_ts() {
    init_test_tracing();
    let harness = ProcessorHarness::new(users_schema());
    harness
        .assign_tables(table_infos(&[(USERS_TABLE_ID, 5)]))
        .await;

    let table_span = Span::table(USERS_TABLE_ID);
    for ts in [10, 20, 30] {
        harness
            .factory
            .push(&table_span, row_raw_txn(ts, USERS_TABLE_ID, b"1", b"v"));
    }
    harness.factory.push(&Span::ddl(), RawTxn::heartbeat(40));

    let processor = harness
        .create_processor(fast_processor_config(), 5)
        .await
        .unwrap();
    let handle = processor.start();
    let mut progress = handle.progress();

    harness.set_global_resolved_ts(15).await;
    wait_for_progress(&mut progress, |info| info.checkpoint_ts >= 15).await;

    let rows = harness.sink.rows().await;
    assert_eq!(rows.iter().map(|row| row.ts).collect::<Vec<_>>(), vec![10]);
    assert_eq!(rows[0].table_name, "users");

    harness.set_global_resolved_ts(25).await;
    let info = wait_for_progress(&mut progress, |info| info.checkpoint_ts >= 25).await;
    assert_eq!(info.checkpoint_ts, 25);
    assert!(info.resolved_ts >= info.checkpoint_ts);

    // The row at 30 is past the barrier and stays buffered.
    let rows = harness.sink.rows().await;
    assert_eq!(rows.iter().map(|row| row.ts).collect::<Vec<_>>(), vec![10, 20]);

    // Every table saw 30 and the ddl puller 40, so the local resolved ts catches up with 30.
    let info = wait_for_progress(&mut progress, |info| info.resolved_ts >= 30).await;
    assert_eq!(info.resolved_ts, 30);

    handle.shutdown_and_wait().await.unwrap();

    let stored = harness.stored_info().await.unwrap();
    assert_eq!(stored.checkpoint_ts, 25);
    assert_eq!(stored.resolved_ts, 30);
    assert!(harness.sink.is_shutdown().await);
    assert_eq!(harness.sink.rows().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn ddl_is_applied_before_rows_at_the_same_ts() {
    init_test_tracing();
    let harness = ProcessorHarness::new(users_schema());
    harness
        .assign_tables(table_infos(&[(USERS_TABLE_ID, 5)]))
        .await;

    let rename = rename_table_job(2, 50, USERS_TABLE_ID, "accounts");
    harness.factory.push(&Span::ddl(), ddl_raw_txn(&rename));

    let table_span = Span::table(USERS_TABLE_ID);
    harness
        .factory
        .push(&table_span, row_raw_txn(40, USERS_TABLE_ID, b"1", b"before"));
    harness
        .factory
        .push(&table_span, row_raw_txn(50, USERS_TABLE_ID, b"1", b"after"));
    harness.factory.push(&table_span, RawTxn::heartbeat(60));

    let processor = harness
        .create_processor(fast_processor_config(), 5)
        .await
        .unwrap();
    let handle = processor.start();
    let mut progress = handle.progress();

    // Release rows only once the job is known, as the ddl puller would be ahead in practice.
    let schema = &harness.schema;
    wait_until(|| async move { !schema.pending_jobs().is_empty() }).await;

    harness.set_global_resolved_ts(55).await;
    wait_for_progress(&mut progress, |info| info.checkpoint_ts >= 55).await;

    let rows = harness.sink.rows().await;
    let names: Vec<_> = rows
        .iter()
        .map(|row| (row.ts, row.table_name.as_str()))
        .collect();
    assert_eq!(names, vec![(40, "users"), (50, "accounts")]);

    // Schema changes are applied, never delivered.
    assert!(
        harness
            .sink
            .txns()
            .await
            .iter()
            .all(|txn| matches!(txn, Txn::Dml { .. }))
    );
    assert_eq!(harness.schema.applied_jobs().last(), Some(&rename));
    assert!(harness.schema.pending_jobs().is_empty());

    handle.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_persists_progress_exactly_once() {
    init_test_tracing();
    let harness = ProcessorHarness::new(users_schema());
    harness
        .assign_tables(table_infos(&[(USERS_TABLE_ID, 5)]))
        .await;
    let key = harness.sub_changefeed_key();
    assert_eq!(harness.store.writes(&key).await, 1);

    let config = ProcessorConfig {
        persist_interval_ms: 60_000,
        ..fast_processor_config()
    };
    let processor = harness.create_processor(config, 5).await.unwrap();
    let handle = processor.start();
    let mut progress = handle.progress();

    harness.set_global_resolved_ts(8).await;
    harness
        .factory
        .push(&Span::table(USERS_TABLE_ID), RawTxn::heartbeat(9));
    wait_for_progress(&mut progress, |info| info.checkpoint_ts >= 8).await;

    // No periodic write can happen with such a long interval.
    assert_eq!(harness.store.writes(&key).await, 1);

    handle.shutdown_and_wait().await.unwrap();

    assert_eq!(harness.store.writes(&key).await, 2);
    assert_eq!(harness.store.conflicts(&key).await, 0);
    let stored = harness.stored_info().await.unwrap();
    assert_eq!(stored.checkpoint_ts, 8);
    assert_eq!(stored.table_ids(), vec![USERS_TABLE_ID]);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_assignment_starts_without_tables() {
    init_test_tracing();
    let harness = ProcessorHarness::new(MemorySchemaStorage::new());

    let processor = harness
        .create_processor(fast_processor_config(), 5)
        .await
        .unwrap();
    let handle = processor.start();

    harness
        .store
        .wait_for_writes(&harness.sub_changefeed_key(), 1)
        .await;

    let mut out = Vec::new();
    handle.write_debug_info(&mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("tables: []"));
    assert!(!out.contains("table id"));

    handle.shutdown_and_wait().await.unwrap();

    let stored = harness.stored_info().await.unwrap();
    assert!(stored.table_infos.is_empty());
    assert_eq!(harness.factory.created_for(&Span::ddl()), vec![5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn puller_failure_is_reported_and_stops_the_processor() {
    init_test_tracing();
    let mut harness = ProcessorHarness::new(users_schema());
    harness
        .assign_tables(table_infos(&[(USERS_TABLE_ID, 5), (2, 5)]))
        .await;
    harness.factory.fail_next(&Span::table(2), "connection reset");

    let processor = harness
        .create_processor(fast_processor_config(), 5)
        .await
        .unwrap();
    let handle = processor.start();

    let err = timeout(Duration::from_secs(10), harness.errors_rx.recv())
        .await
        .expect("an error is reported")
        .expect("the error channel is open");
    assert_eq!(err.kind(), ErrorKind::PullerFailed);

    assert!(handle.is_cancelled());
    handle.wait().await.unwrap();

    // Nothing else failed while stopping.
    assert!(harness.errors_rx.try_recv().is_err());
    assert!(harness.sink.is_shutdown().await);
}
