use crate::error::CdcResult;
use crate::types::{RawTxn, Txn};

/// Turns a raw transaction into a DDL job or a set of row changes.
///
/// Mounting only depends on the current schema snapshot, so callers must apply pending schema
/// changes before mounting a row change at a given timestamp.
pub trait Mounter: Send + Sync {
    fn mount(&self, raw_txn: &RawTxn) -> CdcResult<Txn>;
}
