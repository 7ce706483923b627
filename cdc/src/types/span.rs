use std::fmt;

use crate::types::TableId;

const TABLE_PREFIX: &[u8] = b"t";
const RECORD_PREFIX_SEP: &[u8] = b"_r";
const DDL_JOB_LIST_KEY: &[u8] = b"mDDLJobList";

/// Length of an encoded table record prefix: `t` + 8 byte table id + `_r`.
const TABLE_RECORD_PREFIX_LEN: usize = TABLE_PREFIX.len() + 8 + RECORD_PREFIX_SEP.len();

/// A half-open key range `[start, end)` identifying one change stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl Span {
    /// Span covering every row key of `table_id`.
    pub fn table(table_id: TableId) -> Self {
        let start = encode_table_record_prefix(table_id);
        let end = prefix_next(&start);
        Self { start, end }
    }

    /// Span covering the schema-change job list.
    pub fn ddl() -> Self {
        Self {
            start: DDL_JOB_LIST_KEY.to_vec(),
            end: prefix_next(DDL_JOB_LIST_KEY),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && key < self.end.as_slice()
    }

    pub fn is_ddl(&self) -> bool {
        *self == Span::ddl()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            String::from_utf8_lossy(&self.start),
            String::from_utf8_lossy(&self.end)
        )
    }
}

/// Encodes a row key for `table_id` with the given handle.
pub fn encode_row_key(table_id: TableId, handle: &[u8]) -> Vec<u8> {
    let mut key = encode_table_record_prefix(table_id);
    key.extend_from_slice(handle);
    key
}

/// Encodes the key under which schema-change job `job_id` is queued.
pub fn encode_ddl_job_key(job_id: i64) -> Vec<u8> {
    let mut key = DDL_JOB_LIST_KEY.to_vec();
    key.extend_from_slice(&encode_int(job_id));
    key
}

/// Splits a row key into its table id and row handle.
///
/// Returns `None` if the key is not a row key.
pub fn decode_row_key(key: &[u8]) -> Option<(TableId, &[u8])> {
    if key.len() < TABLE_RECORD_PREFIX_LEN || !key.starts_with(TABLE_PREFIX) {
        return None;
    }

    let id_bytes = &key[TABLE_PREFIX.len()..TABLE_PREFIX.len() + 8];
    let separator = &key[TABLE_PREFIX.len() + 8..TABLE_RECORD_PREFIX_LEN];
    if separator != RECORD_PREFIX_SEP {
        return None;
    }

    let raw = u64::from_be_bytes(id_bytes.try_into().ok()?);
    Some(((raw ^ SIGN_MASK) as i64, &key[TABLE_RECORD_PREFIX_LEN..]))
}

/// Decodes the table id from a row key.
pub fn decode_table_id(key: &[u8]) -> Option<TableId> {
    decode_row_key(key).map(|(table_id, _)| table_id)
}

const SIGN_MASK: u64 = 0x8000_0000_0000_0000;

/// Memcomparable encoding of an `i64`: big endian with the sign bit flipped.
fn encode_int(value: i64) -> [u8; 8] {
    ((value as u64) ^ SIGN_MASK).to_be_bytes()
}

fn encode_table_record_prefix(table_id: TableId) -> Vec<u8> {
    let mut key = Vec::with_capacity(TABLE_RECORD_PREFIX_LEN);
    key.extend_from_slice(TABLE_PREFIX);
    key.extend_from_slice(&encode_int(table_id));
    key.extend_from_slice(RECORD_PREFIX_SEP);
    key
}

/// Smallest key greater than every key starting with `prefix`.
fn prefix_next(prefix: &[u8]) -> Vec<u8> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.pop() {
        if last < u8::MAX {
            next.push(last + 1);
            return next;
        }
    }

    // All bytes were 0xff, so there is no upper bound.
    Vec::new()
}
