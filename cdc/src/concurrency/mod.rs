//! Concurrency utilities shared by the processor workers.
//!
//! [`group::TaskGroup`] runs related tasks under one cancellation scope where the first failure
//! cancels its siblings, and [`retry`] wraps fallible coordination-store calls in a bounded,
//! cancellable exponential backoff.

pub mod group;
pub mod retry;
