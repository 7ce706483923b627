//! Access to the coordination store holding changefeed metadata and processor progress.

mod base;
pub mod client;
pub mod keys;
pub mod memory;

pub use base::*;
