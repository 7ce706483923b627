use crate::error::CdcResult;
use crate::types::{DdlJob, TableId, Ts};

/// Snapshot of a table's schema at the current applied timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
}

impl TableSchema {
    pub fn new(id: TableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Applied schema-change history and the table snapshot derived from it.
///
/// Jobs are registered ahead of time with [`SchemaStorage::add_job`] and only take effect once
/// [`SchemaStorage::handle_pending_ddl`] is called with a timestamp at or after theirs.
pub trait SchemaStorage: Send + Sync {
    fn add_job(&self, job: DdlJob) -> CdcResult<()>;

    /// Applies, in timestamp order, every pending job whose timestamp is `<= ts`.
    fn handle_pending_ddl(&self, ts: Ts) -> CdcResult<()>;

    fn table_schema(&self, table_id: TableId) -> Option<TableSchema>;
}
