use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a connection pool or one of its connections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    #[error("unable to connect: {0}")]
    Connect(String),

    #[error("no pooled connection became available within {0:?}")]
    PoolTimeout(Duration),

    #[error("statement failed: {0}")]
    Statement(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("statistics requested over an empty sample set")]
    EmptySampleSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("`{0}` must be at least 1")]
    Zero(&'static str),

    #[error("`{setting}` must be at most {max}")]
    TooLarge { setting: &'static str, max: u64 },
}
