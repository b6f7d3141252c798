//! Core types shared by the dbperf engine, its stores and its CLI.
mod config;
mod constants;
mod data;
mod error;
mod pool;
mod recorder;
mod stats;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use pool::*;
pub use recorder::*;
pub use stats::*;
