use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::schema::{SchemaStorage, TableSchema};
use crate::types::{DdlJob, DdlKind, TableId, Ts};

#[derive(Debug, Default)]
struct Inner {
    /// Jobs waiting for their timestamp, keyed by `(ts, job id)`.
    pending: BTreeMap<(Ts, i64), DdlJob>,
    applied: Vec<DdlJob>,
    tables: HashMap<TableId, TableSchema>,
}

impl Inner {
    fn is_known(&self, job: &DdlJob) -> bool {
        self.pending.contains_key(&(job.ts, job.id))
            || self.applied.iter().any(|applied| applied.id == job.id)
    }

    fn apply(&mut self, job: DdlJob) -> CdcResult<()> {
        match job.kind {
            DdlKind::CreateTable => {
                if self.tables.contains_key(&job.table_id) {
                    bail!(
                        ErrorKind::SchemaStorageFailed,
                        "Table already exists",
                        format!("job {} creates existing table {}", job.id, job.table_id)
                    );
                }
                self.tables.insert(
                    job.table_id,
                    TableSchema::new(job.table_id, job.table_name.clone()),
                );
            }
            DdlKind::RenameTable => {
                let Some(table) = self.tables.get_mut(&job.table_id) else {
                    bail!(
                        ErrorKind::SchemaStorageFailed,
                        "Renamed table does not exist",
                        format!("job {} renames missing table {}", job.id, job.table_id)
                    );
                };
                table.name = job.table_name.clone();
            }
            DdlKind::DropTable => {
                if self.tables.remove(&job.table_id).is_none() {
                    bail!(
                        ErrorKind::SchemaStorageFailed,
                        "Dropped table does not exist",
                        format!("job {} drops missing table {}", job.id, job.table_id)
                    );
                }
            }
        }

        info!(job_id = job.id, ts = job.ts, kind = ?job.kind, table_id = job.table_id, "applied ddl job");
        self.applied.push(job);

        Ok(())
    }
}

/// In-memory [`SchemaStorage`].
///
/// Can be seeded with already applied history, the way a capture loads the historical DDL jobs
/// of the source before starting.
#[derive(Debug, Default)]
pub struct MemorySchemaStorage {
    inner: Mutex<Inner>,
}

impl MemorySchemaStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a storage with `history` applied in order.
    pub fn from_history(history: Vec<DdlJob>) -> CdcResult<Self> {
        let storage = Self::new();
        {
            let mut inner = storage.lock();
            for job in history {
                inner.apply(job)?;
            }
        }

        Ok(storage)
    }

    /// Every applied job, in application order.
    pub fn applied_jobs(&self) -> Vec<DdlJob> {
        self.lock().applied.clone()
    }

    pub fn pending_jobs(&self) -> Vec<DdlJob> {
        self.lock().pending.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SchemaStorage for MemorySchemaStorage {
    fn add_job(&self, job: DdlJob) -> CdcResult<()> {
        let mut inner = self.lock();
        if inner.is_known(&job) {
            debug!(job_id = job.id, "ignoring already known ddl job");
            return Ok(());
        }

        debug!(job_id = job.id, ts = job.ts, "registered pending ddl job");
        inner.pending.insert((job.ts, job.id), job);

        Ok(())
    }

    fn handle_pending_ddl(&self, ts: Ts) -> CdcResult<()> {
        let mut inner = self.lock();
        while let Some(entry) = inner.pending.first_entry() {
            if entry.key().0 > ts {
                break;
            }

            let job = entry.remove();
            inner.apply(job)?;
        }

        Ok(())
    }

    fn table_schema(&self, table_id: TableId) -> Option<TableSchema> {
        self.lock().tables.get(&table_id).cloned()
    }
}
