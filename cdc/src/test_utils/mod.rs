//! Helpers for driving a processor in tests.
//!
//! - [`puller`] provides a puller factory whose streams are fed by the test.
//! - [`store`] wraps the in-memory coordination store and records writes.
//! - [`processor`] wires a processor over in-memory collaborators.
//! - [`fixtures`] builds raw transactions and schema jobs.
//! - [`notify`] bounds waits so that a stuck test fails instead of hanging.

#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod fixtures;
pub mod notify;
pub mod processor;
pub mod puller;
pub mod store;
