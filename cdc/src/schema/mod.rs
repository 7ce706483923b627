//! Schema history consulted when mounting row changes.

mod base;
pub mod memory;

pub use base::*;
