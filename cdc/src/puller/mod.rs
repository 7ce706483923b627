//! Contract of the raw change transport.
//!
//! A puller streams the committed mutations of one key span from a start timestamp and groups
//! them into raw transactions delivered in non-decreasing commit order.

mod base;
mod collector;
mod handle;

pub use base::*;
pub use collector::*;
pub use handle::*;
