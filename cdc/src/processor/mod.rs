//! The per-capture changefeed processor.

pub mod buffer;
pub mod progress;
pub mod reconcile;
mod reporter;
mod runner;
pub mod tables;
pub mod workers;

pub use reporter::ErrorReporter;
pub use runner::{Processor, ProcessorHandle};
