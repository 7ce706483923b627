mod base;
mod capture;
mod processor;
mod retry;

pub use base::*;
pub use capture::*;
pub use processor::*;
pub use retry::*;
