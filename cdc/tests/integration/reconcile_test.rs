use cdc::schema::memory::MemorySchemaStorage;
use cdc::test_utils::fixtures::{
    create_table_job, fast_processor_config, row_raw_txn, table_infos,
};
use cdc::test_utils::processor::{ProcessorHarness, wait_for_progress, wait_until};
use cdc::types::{RawTxn, Span, SubChangeFeedInfo, TableLock};
use telemetry::init_test_tracing;

fn users_schema() -> MemorySchemaStorage {
    MemorySchemaStorage::from_history(vec![create_table_job(1, 1, 1, "users")]).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn owner_reassignment_is_reconciled_and_pause_acknowledged() {
    init_test_tracing();
    let harness = ProcessorHarness::new(MemorySchemaStorage::new());
    harness.assign_tables(table_infos(&[(1, 5), (3, 5)])).await;

    let processor = harness
        .create_processor(fast_processor_config(), 5)
        .await
        .unwrap();
    let handle = processor.start();
    let mut progress = handle.progress();

    for table_id in [1, 3] {
        harness
            .factory
            .push(&Span::table(table_id), RawTxn::heartbeat(12));
    }
    harness.set_global_resolved_ts(10).await;
    wait_for_progress(&mut progress, |info| info.checkpoint_ts >= 10).await;

    // The owner moves table 1 away, assigns table 5 and asks for a pause.
    harness
        .assign(&SubChangeFeedInfo {
            table_infos: table_infos(&[(5, 10), (3, 5)]),
            table_p_lock: Some(TableLock {
                ts: 7,
                checkpoint_ts: 0,
            }),
            ..Default::default()
        })
        .await;

    let info = wait_for_progress(&mut progress, |info| info.table_c_lock.is_some()).await;
    assert_eq!(info.table_ids(), vec![3, 5]);
    assert_eq!(
        info.table_c_lock,
        Some(TableLock {
            ts: 7,
            checkpoint_ts: 10
        })
    );
    // Watermarks survive the owner's overwrite.
    assert!(info.checkpoint_ts >= 10);

    let observer = &harness;
    wait_until(|| async move {
        observer
            .stored_info()
            .await
            .is_some_and(|info| info.table_c_lock.is_some())
    })
    .await;

    let stored = harness.stored_info().await.unwrap();
    assert_eq!(stored.table_ids(), vec![3, 5]);
    assert_eq!(stored.table_p_lock.map(|lock| lock.ts), Some(7));
    assert_eq!(stored.table_c_lock.map(|lock| lock.checkpoint_ts), Some(10));
    assert!(stored.checkpoint_ts >= 10);

    // Table 3 kept its puller, table 5 got a new one at its own start ts.
    assert_eq!(harness.factory.created_for(&Span::table(1)), vec![5]);
    assert_eq!(harness.factory.created_for(&Span::table(3)), vec![5]);
    assert_eq!(harness.factory.created_for(&Span::table(5)), vec![10]);

    let mut out = Vec::new();
    handle.write_debug_info(&mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("table id: 3, start ts: 5"));
    assert!(out.contains("table id: 5, start ts: 10"));
    assert!(!out.contains("table id: 1,"));

    handle.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn tables_assigned_while_running_receive_rows() {
    init_test_tracing();
    let harness = ProcessorHarness::new(users_schema());
    harness.assign_tables(Vec::new()).await;

    let processor = harness
        .create_processor(fast_processor_config(), 5)
        .await
        .unwrap();
    let handle = processor.start();
    let mut progress = handle.progress();

    harness.assign_tables(table_infos(&[(1, 5)])).await;
    wait_for_progress(&mut progress, |info| info.table_ids() == vec![1]).await;

    let span = Span::table(1);
    harness
        .factory
        .push(&span, row_raw_txn(8, 1, b"1", b"v"));
    harness.factory.push(&span, RawTxn::heartbeat(20));
    harness.set_global_resolved_ts(15).await;

    wait_for_progress(&mut progress, |info| info.checkpoint_ts >= 15).await;
    let rows = harness.sink.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].ts, rows[0].table_id), (8, 1));

    handle.shutdown_and_wait().await.unwrap();
}
