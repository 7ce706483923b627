use config::shared::{ProcessorConfig, RetryConfig};

use crate::types::{
    DdlJob, DdlKind, ProcessTableInfo, RawKvEntry, RawTxn, TableId, Ts, encode_ddl_job_key,
    encode_row_key,
};

pub fn create_table_job(id: i64, ts: Ts, table_id: TableId, table_name: &str) -> DdlJob {
    DdlJob {
        id,
        ts,
        kind: DdlKind::CreateTable,
        table_id,
        table_name: table_name.to_string(),
        query: format!("CREATE TABLE {table_name} (id INT PRIMARY KEY)"),
    }
}

pub fn rename_table_job(id: i64, ts: Ts, table_id: TableId, new_name: &str) -> DdlJob {
    DdlJob {
        id,
        ts,
        kind: DdlKind::RenameTable,
        table_id,
        table_name: new_name.to_string(),
        query: format!("RENAME TABLE t{table_id} TO {new_name}"),
    }
}

/// Raw transaction queuing `job` in the DDL job list.
pub fn ddl_raw_txn(job: &DdlJob) -> RawTxn {
    let payload = serde_json::to_vec(job).expect("ddl jobs serialize");
    RawTxn::new(job.ts, vec![RawKvEntry::put(encode_ddl_job_key(job.id), payload)])
}

/// Raw transaction upserting one row.
pub fn row_raw_txn(ts: Ts, table_id: TableId, handle: &[u8], value: &[u8]) -> RawTxn {
    RawTxn::new(
        ts,
        vec![RawKvEntry::put(encode_row_key(table_id, handle), value.to_vec())],
    )
}

pub fn table_infos(tables: &[(TableId, Ts)]) -> Vec<ProcessTableInfo> {
    tables
        .iter()
        .map(|(id, start_ts)| ProcessTableInfo {
            id: *id,
            start_ts: *start_ts,
        })
        .collect()
}

/// Processor configuration with short intervals so tests observe progress quickly.
pub fn fast_processor_config() -> ProcessorConfig {
    ProcessorConfig {
        resolve_interval_ms: 10,
        persist_interval_ms: 20,
        global_resolved_poll_interval_ms: 5,
        final_persist_timeout_ms: 1_000,
        persist_max_attempts: 3,
        global_resolved_retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 5,
            max_delay_ms: 20,
            backoff_multiplier: 2.0,
            jitter_percent: 0,
        },
        ..ProcessorConfig::default()
    }
}
