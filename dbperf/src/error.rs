use dbperf_core::{ConfigError, DbError, StatsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] DbError),

    #[error("connection pool exhausted: {0}")]
    PoolExhausted(#[source] DbError),

    #[error("{test} failed at iteration {iteration}: {cause}")]
    OperationFailed {
        test: &'static str,
        iteration: u64,
        #[source]
        cause: DbError,
    },

    #[error("{test} failed in worker {worker}: {cause}")]
    WorkerFailed {
        test: &'static str,
        worker: usize,
        #[source]
        cause: Box<BenchError>,
    },

    #[error("worker task did not finish: {0}")]
    WorkerAborted(String),

    #[error("schema setup failed: {0}")]
    SchemaSetupFailed(#[source] DbError),

    #[error("{test} needs existing rows but the test table is empty")]
    EmptyBaseline { test: &'static str },

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl BenchError {
    /// Classifies a failed `acquire`.
    pub fn from_acquire(err: DbError) -> Self {
        match err {
            DbError::PoolTimeout(_) => BenchError::PoolExhausted(err),
            err => BenchError::ConnectionFailed(err),
        }
    }

    /// The worker-level cause for [`BenchError::WorkerFailed`], or `self` for anything else.
    pub fn root(&self) -> &BenchError {
        match self {
            BenchError::WorkerFailed { cause, .. } => cause.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn acquire_timeouts_are_exhaustion() {
        let err = BenchError::from_acquire(DbError::PoolTimeout(Duration::from_secs(1)));
        assert!(matches!(err, BenchError::PoolExhausted(_)));

        let err = BenchError::from_acquire(DbError::Connect("refused".into()));
        assert!(matches!(err, BenchError::ConnectionFailed(_)));
    }

    #[test]
    fn worker_failures_name_the_worker() {
        let err = BenchError::WorkerFailed {
            test: "concurrent_writes",
            worker: 3,
            cause: Box::new(BenchError::OperationFailed {
                test: "concurrent_writes",
                iteration: 7,
                cause: DbError::Statement("deadlock".into()),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("worker 3"), "{msg}");
        assert!(matches!(err.root(), BenchError::OperationFailed { iteration: 7, .. }));
    }
}
