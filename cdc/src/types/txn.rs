use serde::{Deserialize, Serialize};

use crate::types::{TableId, Ts};

/// Kind of a raw key-value mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Put,
    Delete,
}

/// A single key-value mutation pulled from the source store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKvEntry {
    pub op: OpType,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl RawKvEntry {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            op: OpType::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            op: OpType::Delete,
            key: key.into(),
            value: Vec::new(),
        }
    }
}

/// Mutations committed at the same timestamp.
///
/// A transaction without entries is a resolved-ts heartbeat: it only states that nothing older
/// than `ts` is still to come for its span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTxn {
    pub ts: Ts,
    pub entries: Vec<RawKvEntry>,
}

impl RawTxn {
    pub fn new(ts: Ts, entries: Vec<RawKvEntry>) -> Self {
        Self { ts, entries }
    }

    pub fn heartbeat(ts: Ts) -> Self {
        Self {
            ts,
            entries: Vec::new(),
        }
    }

    pub fn is_resolved_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Schema change kinds understood by the schema storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdlKind {
    CreateTable,
    RenameTable,
    DropTable,
}

/// A schema change job, effective at `ts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlJob {
    pub id: i64,
    pub ts: Ts,
    pub kind: DdlKind,
    pub table_id: TableId,
    /// Table name after the job is applied. Unused for drops.
    #[serde(default)]
    pub table_name: String,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChangeKind {
    Upsert,
    Delete,
}

/// A row-level change produced by mounting a raw mutation against the current schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChangedEvent {
    pub ts: Ts,
    pub table_id: TableId,
    pub table_name: String,
    pub kind: RowChangeKind,
    /// Row handle, i.e. the row key without its table prefix.
    pub handle: Vec<u8>,
    pub value: Vec<u8>,
}

/// A mounted, logical transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Txn {
    Ddl { ts: Ts, job: DdlJob },
    Dml { ts: Ts, rows: Vec<RowChangedEvent> },
}

impl Txn {
    pub fn ts(&self) -> Ts {
        match self {
            Txn::Ddl { ts, .. } | Txn::Dml { ts, .. } => *ts,
        }
    }

    pub fn is_ddl(&self) -> bool {
        matches!(self, Txn::Ddl { .. })
    }
}

/// Unit flowing from the table buffers to the sync-resolved worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEntry {
    /// A raw transaction released by a table buffer.
    Dml(RawTxn),
    /// Barrier stating that every DML entry up to this timestamp was already published.
    Resolved(Ts),
}

impl ProcessorEntry {
    pub fn ts(&self) -> Ts {
        match self {
            ProcessorEntry::Dml(txn) => txn.ts,
            ProcessorEntry::Resolved(ts) => *ts,
        }
    }
}
