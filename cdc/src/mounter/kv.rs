use std::sync::Arc;

use crate::bail;
use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};
use crate::mounter::Mounter;
use crate::schema::SchemaStorage;
use crate::types::{
    DdlJob, OpType, RawKvEntry, RawTxn, RowChangeKind, RowChangedEvent, Span, Txn,
    decode_row_key,
};

/// Mounts raw key-value mutations using a [`SchemaStorage`] snapshot.
///
/// Transactions whose keys all fall in the DDL span carry a JSON encoded [`DdlJob`]. Any other
/// transaction is made of row keys and becomes a set of [`RowChangedEvent`]s.
#[derive(Clone)]
pub struct KvMounter {
    schema: Arc<dyn SchemaStorage>,
    ddl_span: Span,
}

impl KvMounter {
    pub fn new(schema: Arc<dyn SchemaStorage>) -> Self {
        Self {
            schema,
            ddl_span: Span::ddl(),
        }
    }

    fn mount_ddl(&self, raw_txn: &RawTxn) -> CdcResult<Txn> {
        // Deletes in the job list only dequeue finished jobs.
        let Some(entry) = raw_txn.entries.iter().find(|entry| entry.op == OpType::Put) else {
            return Ok(Txn::Dml {
                ts: raw_txn.ts,
                rows: Vec::new(),
            });
        };

        let job: DdlJob = serde_json::from_slice(&entry.value).map_err(|err| {
            cdc_error!(
                ErrorKind::MountFailed,
                "Failed to decode ddl job",
                format!("ts {}", raw_txn.ts),
                source: err
            )
        })?;

        Ok(Txn::Ddl {
            ts: raw_txn.ts,
            job,
        })
    }

    fn mount_row(&self, ts: u64, entry: &RawKvEntry) -> CdcResult<RowChangedEvent> {
        let Some((table_id, handle)) = decode_row_key(&entry.key) else {
            bail!(
                ErrorKind::MountFailed,
                "Key is not a row key",
                format!("ts {ts}, key {:?}", entry.key)
            );
        };

        let Some(schema) = self.schema.table_schema(table_id) else {
            bail!(
                ErrorKind::MissingTableSchema,
                "No schema found for table",
                format!("table {table_id} at ts {ts}")
            );
        };

        let kind = match entry.op {
            OpType::Put => RowChangeKind::Upsert,
            OpType::Delete => RowChangeKind::Delete,
        };

        Ok(RowChangedEvent {
            ts,
            table_id,
            table_name: schema.name,
            kind,
            handle: handle.to_vec(),
            value: entry.value.clone(),
        })
    }
}

impl Mounter for KvMounter {
    fn mount(&self, raw_txn: &RawTxn) -> CdcResult<Txn> {
        let is_ddl = !raw_txn.entries.is_empty()
            && raw_txn
                .entries
                .iter()
                .all(|entry| self.ddl_span.contains(&entry.key));
        if is_ddl {
            return self.mount_ddl(raw_txn);
        }

        let rows = raw_txn
            .entries
            .iter()
            .map(|entry| self.mount_row(raw_txn.ts, entry))
            .collect::<CdcResult<Vec<_>>>()?;

        Ok(Txn::Dml {
            ts: raw_txn.ts,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::memory::MemorySchemaStorage;
    use crate::types::{DdlKind, encode_ddl_job_key, encode_row_key};

    fn mounter_with_users() -> KvMounter {
        let storage = MemorySchemaStorage::from_history(vec![DdlJob {
            id: 1,
            ts: 1,
            kind: DdlKind::CreateTable,
            table_id: 7,
            table_name: "users".to_string(),
            query: "create table users".to_string(),
        }])
        .unwrap();
        KvMounter::new(Arc::new(storage))
    }

    #[test]
    fn mounts_ddl_jobs() {
        let job = DdlJob {
            id: 2,
            ts: 50,
            kind: DdlKind::CreateTable,
            table_id: 8,
            table_name: "orders".to_string(),
            query: "create table orders".to_string(),
        };
        let raw = RawTxn::new(
            50,
            vec![RawKvEntry::put(
                encode_ddl_job_key(2),
                serde_json::to_vec(&job).unwrap(),
            )],
        );

        let txn = mounter_with_users().mount(&raw).unwrap();
        assert_eq!(txn, Txn::Ddl { ts: 50, job });
    }

    #[test]
    fn mounts_rows_with_table_names() {
        let raw = RawTxn::new(
            20,
            vec![
                RawKvEntry::put(encode_row_key(7, b"1"), b"alice".to_vec()),
                RawKvEntry::delete(encode_row_key(7, b"2")),
            ],
        );

        let Txn::Dml { ts, rows } = mounter_with_users().mount(&raw).unwrap() else {
            panic!("expected a dml transaction");
        };
        assert_eq!(ts, 20);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].table_name, "users");
        assert_eq!(rows[0].kind, RowChangeKind::Upsert);
        assert_eq!(rows[0].handle, b"1");
        assert_eq!(rows[1].kind, RowChangeKind::Delete);
    }

    #[test]
    fn unknown_table_is_missing_schema() {
        let raw = RawTxn::new(
            20,
            vec![RawKvEntry::put(encode_row_key(99, b"1"), b"x".to_vec())],
        );

        let err = mounter_with_users().mount(&raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingTableSchema);
    }

    #[test]
    fn undecodable_job_fails_to_mount() {
        let raw = RawTxn::new(
            5,
            vec![RawKvEntry::put(encode_ddl_job_key(1), b"garbage".to_vec())],
        );

        let err = mounter_with_users().mount(&raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MountFailed);
    }

    #[test]
    fn job_list_deletes_are_not_ddl() {
        let raw = RawTxn::new(5, vec![RawKvEntry::delete(encode_ddl_job_key(1))]);
        let txn = mounter_with_users().mount(&raw).unwrap();
        assert!(!txn.is_ddl());
    }
}
