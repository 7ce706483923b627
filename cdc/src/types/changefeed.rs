use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TableId, Ts};

/// Immutable configuration of a changefeed, created by an external orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFeedDetail {
    pub sink_uri: String,
    #[serde(default)]
    pub opts: BTreeMap<String, String>,
    pub create_time: DateTime<Utc>,
    /// Timestamp the changefeed starts replicating from.
    pub start_ts: Ts,
    /// Timestamp at which the changefeed stops, `0` for unbounded.
    #[serde(default)]
    pub target_ts: Ts,
    /// Table name patterns replicated by the changefeed. Empty means every table.
    #[serde(default)]
    pub table_filter: Vec<String>,
}

impl ChangeFeedDetail {
    pub fn new(sink_uri: impl Into<String>, start_ts: Ts) -> Self {
        Self {
            sink_uri: sink_uri.into(),
            opts: BTreeMap::new(),
            create_time: Utc::now(),
            start_ts,
            target_ts: 0,
            table_filter: Vec::new(),
        }
    }
}

/// Changefeed-wide progress agreed on by the owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFeedStatus {
    /// Global resolved timestamp used as the forwarding barrier by every processor.
    pub resolved_ts: Ts,
    pub checkpoint_ts: Ts,
}

/// Registration record of a capture process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub id: String,
}

/// A table assigned to a capture together with the timestamp its puller starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTableInfo {
    pub id: TableId,
    pub start_ts: Ts,
}

/// One half of the pause handshake used to move tables between captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLock {
    pub ts: Ts,
    pub checkpoint_ts: Ts,
}

/// Per-(changefeed, capture) progress and table assignment.
///
/// The record is mutated both by the owner (assignment, pause requests) and by the processor
/// (watermarks, pause acknowledgement), so writes go through a compare-and-put on the record's
/// revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChangeFeedInfo {
    /// Everything at or before this timestamp was delivered. Never decreases.
    pub checkpoint_ts: Ts,
    /// Latest resolved candidate, clamped so it never falls below `checkpoint_ts`.
    ///
    /// Above the checkpoint it follows the candidate as is and may move backwards.
    pub resolved_ts: Ts,
    #[serde(default)]
    pub table_infos: Vec<ProcessTableInfo>,
    /// Pause request written by the owner.
    #[serde(default)]
    pub table_p_lock: Option<TableLock>,
    /// Pause acknowledgement written by the processor.
    #[serde(default)]
    pub table_c_lock: Option<TableLock>,
}

impl SubChangeFeedInfo {
    /// Sorts the assignment by table id, the order reconciliation relies on.
    pub fn sort_table_infos(&mut self) {
        self.table_infos.sort_by_key(|table| table.id);
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        self.table_infos.iter().map(|table| table.id).collect()
    }

    /// Stores a new resolved timestamp candidate, never letting it fall below the checkpoint.
    pub fn set_resolved_ts(&mut self, candidate: Ts) {
        self.resolved_ts = candidate.max(self.checkpoint_ts);
    }

    /// Moves the checkpoint forward, raising the resolved timestamp along with it if needed.
    pub fn advance_checkpoint_ts(&mut self, ts: Ts) {
        self.checkpoint_ts = self.checkpoint_ts.max(ts);
        self.resolved_ts = self.resolved_ts.max(self.checkpoint_ts);
    }

    /// Acknowledges a pending pause request at `checkpoint_ts`.
    ///
    /// Returns `true` if an acknowledgement was stamped.
    pub fn acknowledge_pause(&mut self, checkpoint_ts: Ts) -> bool {
        match (self.table_p_lock, self.table_c_lock) {
            (Some(p_lock), None) => {
                self.table_c_lock = Some(TableLock {
                    ts: p_lock.ts,
                    checkpoint_ts,
                });
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for SubChangeFeedInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checkpoint_ts: {}, resolved_ts: {}, tables: {:?}",
            self.checkpoint_ts,
            self.resolved_ts,
            self.table_ids()
        )?;
        if let Some(p_lock) = self.table_p_lock {
            write!(f, ", p_lock: {}", p_lock.ts)?;
        }
        if let Some(c_lock) = self.table_c_lock {
            write!(f, ", c_lock: {}@{}", c_lock.ts, c_lock.checkpoint_ts)?;
        }

        Ok(())
    }
}
