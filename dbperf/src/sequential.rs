//! Single-connection workloads.
//!
//! Every runner follows the same loop: build the next statement outside the timed span, then
//! time the statement together with any commit it triggers and record that as one sample. The
//! first failure aborts the test and its partial samples are discarded.
use crate::commit::CommitBatcher;
use crate::measurement::measure;
use crate::BenchError;
use dbperf_core::{
    ConfigError, Connection, KeyRange, LatencyRecorder, Row, Statement, TestKind, TestResult,
    PROGRESS_FRACTION, RANGE_READ_SEED,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// `count` rows, one per statement, committing every `commit_every` rows.
pub async fn run_inserts<C: Connection>(
    conn: &mut C,
    count: u64,
    commit_every: u64,
) -> Result<TestResult, BenchError> {
    if commit_every == 0 {
        return Err(ConfigError::Zero("commit_every").into());
    }
    let kind = TestKind::SingleInserts { commit_every };
    let batcher = CommitBatcher::every(kind.name(), commit_every);
    run_sequential(conn, kind, count, 1, batcher, |i| {
        Statement::Insert(Row::generate("test_data", i, i as i64))
    })
    .await
}

/// `batches` multi-row inserts of `batch_size` rows each. Every batch is its own transaction.
pub async fn run_batch_inserts<C: Connection>(
    conn: &mut C,
    batches: u64,
    batch_size: u64,
) -> Result<TestResult, BenchError> {
    if batch_size == 0 {
        return Err(ConfigError::Zero("batch_size").into());
    }
    let kind = TestKind::BatchInserts {
        batches,
        batch_size,
    };
    let batcher = CommitBatcher::every(kind.name(), 1);
    run_sequential(conn, kind, batches, batch_size, batcher, |batch| {
        let tag = format!("batch_data_{batch}");
        let rows = (0..batch_size)
            .map(|i| Row::generate(&tag, i, (batch * batch_size + i) as i64))
            .collect();
        Statement::InsertBatch(rows)
    })
    .await
}

/// `count` single-row updates spread over `keys`, each committed on its own.
pub async fn run_updates<C: Connection>(
    conn: &mut C,
    count: u64,
    keys: KeyRange,
) -> Result<TestResult, BenchError> {
    let kind = TestKind::Updates;
    require_rows(kind, keys)?;
    let batcher = CommitBatcher::every(kind.name(), 1);
    run_sequential(conn, kind, count, 1, batcher, |i| Statement::Update {
        id: keys.nth_wrapping(i),
        test_data: format!("updated_data_{i}"),
    })
    .await
}

/// Primary-key lookups walking `keys` in order, wrapping at the end.
pub async fn run_point_reads<C: Connection>(
    conn: &mut C,
    count: u64,
    keys: KeyRange,
) -> Result<TestResult, BenchError> {
    let kind = TestKind::PointReads;
    require_rows(kind, keys)?;
    let batcher = CommitBatcher::never(kind.name());
    run_sequential(conn, kind, count, 1, batcher, |i| Statement::PointRead {
        id: keys.nth_wrapping(i),
    })
    .await
}

/// `count` scans of `range_size` consecutive keys starting at seeded-random offsets.
pub async fn run_range_reads<C: Connection>(
    conn: &mut C,
    count: u64,
    range_size: u64,
    keys: KeyRange,
) -> Result<TestResult, BenchError> {
    if range_size == 0 {
        return Err(ConfigError::Zero("range_size").into());
    }
    let kind = TestKind::RangeReads { range_size };
    require_rows(kind, keys)?;
    if range_size > keys.len() {
        debug!(
            "Range of {range_size} is larger than the {} rows available; clipping",
            keys.len()
        );
    }

    let mut rng = SmallRng::seed_from_u64(RANGE_READ_SEED);
    let batcher = CommitBatcher::never(kind.name());
    run_sequential(conn, kind, count, 1, batcher, |_| {
        let offset = rng.gen_range(0..keys.window_starts(range_size));
        let (first, last) = keys.window(offset, range_size);
        Statement::RangeRead { first, last }
    })
    .await
}

fn require_rows(kind: TestKind, keys: KeyRange) -> Result<(), BenchError> {
    if keys.is_empty() {
        Err(BenchError::EmptyBaseline { test: kind.name() })
    } else {
        Ok(())
    }
}

#[instrument(name = "test", skip_all, fields(name = kind.name()))]
async fn run_sequential<C, F>(
    conn: &mut C,
    kind: TestKind,
    ops: u64,
    records_per_op: u64,
    mut batcher: CommitBatcher,
    mut next_statement: F,
) -> Result<TestResult, BenchError>
where
    C: Connection,
    F: FnMut(u64) -> Statement,
{
    let test = kind.name();
    info!("Running {test} with {ops} operations");

    let mut recorder = LatencyRecorder::with_capacity(ops as usize);
    let progress = Progress::new(test, ops);
    let start = Instant::now();

    for i in 0..ops {
        let statement = next_statement(i);
        let (res, elapsed) = measure(test, async {
            conn.execute(statement).await?;
            batcher.tick(&mut *conn).await
        })
        .await;
        res.map_err(|cause| BenchError::OperationFailed {
            test,
            iteration: i,
            cause,
        })?;
        recorder.record_duration(elapsed);
        progress.step(i + 1);
    }

    batcher
        .flush(&mut *conn)
        .await
        .map_err(|cause| BenchError::OperationFailed {
            test,
            iteration: ops,
            cause,
        })?;
    let elapsed = start.elapsed();

    let stats = recorder.summarize()?;
    let result = TestResult::new(kind, elapsed, ops * records_per_op, stats);
    debug!("{test} issued {} commits", batcher.commits());
    info!("{result}");
    Ok(result)
}

/// Logs every `PROGRESS_FRACTION`th of a test.
pub(crate) struct Progress {
    test: &'static str,
    total: u64,
    step: u64,
}

impl Progress {
    pub fn new(test: &'static str, total: u64) -> Self {
        Self {
            test,
            total,
            step: (total / PROGRESS_FRACTION).max(1),
        }
    }

    pub fn step(&self, done: u64) {
        if done % self.step == 0 || done == self.total {
            info!(
                "Progress: {}/{} {} ({:.0}%)",
                done,
                self.total,
                self.test,
                done as f64 * 100. / self.total as f64
            );
        }
    }
}
