#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod commit;
mod error;
mod measurement;

pub mod compare;
pub mod concurrent;
pub mod orchestrator;
pub mod report;
pub mod sequential;

#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub mod mysql;

pub use error::BenchError;
#[cfg(feature = "metrics")]
pub use measurement::describe_metrics;
pub use orchestrator::{Orchestrator, Phase, RunOutcome, RunStatus};

pub mod prelude {
    pub use crate::orchestrator::{Orchestrator, RunOutcome, RunStatus};
    pub use crate::BenchError;
    pub use dbperf_core::{BenchConfig, ConnectionConfig, PoolConfig, RunReport, WorkloadConfig};

    #[cfg(feature = "mysql")]
    pub use crate::mysql::MySqlStore;
}

pub use dbperf_core as core;
