//! Many writers at once, one pooled connection each.
use crate::commit::CommitBatcher;
use crate::measurement::measure;
use crate::BenchError;
use dbperf_core::{
    ConfigError, Connection, ConnectionPool, LatencyRecorder, Row, Statement, TestKind, TestResult,
};
use futures_util::future::join_all;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, Instrument};

/// What one worker task hands back to the runner.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub completed: u64,
    pub elapsed: Duration,
    pub samples: LatencyRecorder,
    pub failure: Option<BenchError>,
}

impl WorkerOutcome {
    fn new(worker: usize, expected: u64) -> Self {
        Self {
            worker,
            completed: 0,
            elapsed: Duration::ZERO,
            samples: LatencyRecorder::with_capacity(expected as usize),
            failure: None,
        }
    }

    fn failed(mut self, failure: BenchError, start: Instant) -> Self {
        self.elapsed = start.elapsed();
        self.failure = Some(failure);
        self
    }
}

/// Runs `thread_count` insert workers in parallel and merges their samples.
///
/// Each worker holds one connection for its whole lifetime and inserts `writes_per_thread`
/// rows, committing every `commit_every`. The wall clock spans from before the first spawn to
/// after the last worker has been joined. A single failing worker fails the whole test.
#[instrument(name = "test", skip_all, fields(name = "concurrent_writes"))]
pub async fn run_concurrent_inserts<P: ConnectionPool>(
    pool: &P,
    thread_count: usize,
    writes_per_thread: u64,
    commit_every: u64,
) -> Result<TestResult, BenchError> {
    if commit_every == 0 {
        return Err(ConfigError::Zero("commit_every").into());
    }
    let kind = TestKind::ConcurrentWrites {
        threads: thread_count,
        writes_per_thread,
        commit_every,
    };
    info!("Running {thread_count} writers with {writes_per_thread} inserts each");

    let start = Instant::now();
    let handles: Vec<_> = (0..thread_count)
        .map(|worker| {
            let pool = pool.clone();
            tokio::spawn(
                insert_worker(pool, kind, worker, writes_per_thread, commit_every)
                    .in_current_span(),
            )
        })
        .collect();

    let outcomes = join_all(handles)
        .await
        .into_iter()
        .enumerate()
        .map(|(worker, joined)| {
            joined.unwrap_or_else(|err| WorkerOutcome {
                failure: Some(BenchError::WorkerAborted(err.to_string())),
                ..WorkerOutcome::new(worker, 0)
            })
        })
        .collect();
    let elapsed = start.elapsed();

    let result = merge_outcomes(kind, outcomes, elapsed)?;
    info!("{result}");
    Ok(result)
}

/// Folds worker outcomes into one result. Any failure wins over every sample; the lowest
/// failing worker index is the one reported.
pub fn merge_outcomes(
    kind: TestKind,
    outcomes: Vec<WorkerOutcome>,
    elapsed: Duration,
) -> Result<TestResult, BenchError> {
    let test = kind.name();
    let mut merged = LatencyRecorder::new();
    let mut completed = 0;
    let mut first_failure: Option<(usize, BenchError)> = None;

    for outcome in outcomes {
        if let Some(failure) = outcome.failure {
            error!("Worker {} failed: {failure}", outcome.worker);
            match &first_failure {
                Some((worker, _)) if *worker < outcome.worker => {}
                _ => first_failure = Some((outcome.worker, failure)),
            }
            continue;
        }
        debug!(
            "Worker {} finished {} writes in {}",
            outcome.worker,
            outcome.completed,
            humantime::format_duration(outcome.elapsed)
        );
        completed += outcome.completed;
        merged.extend(outcome.samples);
    }

    if let Some((worker, cause)) = first_failure {
        return Err(BenchError::WorkerFailed {
            test,
            worker,
            cause: Box::new(cause),
        });
    }

    let stats = merged.summarize()?;
    Ok(TestResult::new(kind, elapsed, completed, stats))
}

async fn insert_worker<P: ConnectionPool>(
    pool: P,
    kind: TestKind,
    worker: usize,
    writes: u64,
    commit_every: u64,
) -> WorkerOutcome {
    let test = kind.name();
    let start = Instant::now();
    let mut outcome = WorkerOutcome::new(worker, writes);

    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(err) => return outcome.failed(BenchError::from_acquire(err), start),
    };
    let tag = format!("thread_{worker}_data");
    let stride = worker as u64 * writes;
    let mut batcher = CommitBatcher::every(test, commit_every);

    for i in 0..writes {
        let row = Row::generate(&tag, i, (stride + i) as i64);
        let (res, elapsed) = measure(test, async {
            conn.execute(Statement::Insert(row)).await?;
            batcher.tick(&mut conn).await
        })
        .await;
        if let Err(cause) = res {
            let failure = BenchError::OperationFailed {
                test,
                iteration: i,
                cause,
            };
            return outcome.failed(failure, start);
        }
        outcome.samples.record_duration(elapsed);
        outcome.completed += 1;
    }

    if let Err(cause) = batcher.flush(&mut conn).await {
        let failure = BenchError::OperationFailed {
            test,
            iteration: writes,
            cause,
        };
        return outcome.failed(failure, start);
    }

    outcome.elapsed = start.elapsed();
    outcome
}
