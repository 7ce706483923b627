//! Common types used throughout the processor.
//!
//! Covers changefeed metadata kept in the coordination store, key spans, raw transactions
//! produced by pullers and the logical transactions produced by mounters.

mod changefeed;
mod span;
mod txn;

pub use changefeed::*;
pub use span::*;
pub use txn::*;

/// Identifier of a table in the source store.
pub type TableId = i64;

/// Commit or watermark timestamp in the source store's timestamp oracle.
pub type Ts = u64;
