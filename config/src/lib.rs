//! Configuration types and layered loading for capture processes.

pub mod environment;
mod load;
pub mod shared;

pub use load::{Config, LoadConfigError, load_config, load_config_from};
