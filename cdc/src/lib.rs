//! Per-capture changefeed processor.
//!
//! A [`processor::Processor`] owns the table pullers assigned to one capture of a changefeed,
//! fences their output at the changefeed's global resolved timestamp, applies schema changes
//! at the right transactional boundary, delivers mounted transactions to a [`sink::Sink`] and
//! persists progress to a [`store::CoordinationStore`].

pub mod concurrency;
pub mod error;
pub mod failpoints;
mod macros;
pub mod metrics;
pub mod mounter;
pub mod processor;
pub mod puller;
pub mod schema;
pub mod sink;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
