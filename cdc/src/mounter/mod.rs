//! Conversion of raw transactions into logical ones.

mod base;
pub mod kv;

pub use base::*;
