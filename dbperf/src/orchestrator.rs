//! Drives a whole run: connect, set up the schema, run each enabled test in a fixed order and
//! clean up.
use crate::{concurrent, sequential, BenchError};
use dbperf_core::{
    BenchConfig, Connection, ConnectionPool, DbError, KeyRange, Row, RunReport, ServerInfo,
    Statement, BASELINE_BATCH_SIZE, PERCENTILE_RULE,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const READ_SETUP: &str = "read_setup";

/// Where a run currently is. Transitions are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Connecting,
    ConnectionFailed,
    Connected,
    SchemaSetup,
    WriteTests,
    ReadSetup,
    ReadTests,
    Cleanup,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
pub enum RunStatus {
    Completed,
    ConnectionFailed(BenchError),
    SchemaSetupFailed(BenchError),
    WorkloadFailed {
        test: &'static str,
        error: BenchError,
    },
}

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::ConnectionFailed(_) => 2,
            RunStatus::WorkloadFailed { .. } => 3,
            RunStatus::SchemaSetupFailed(_) => 4,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::ConnectionFailed(err) => write!(f, "{err}"),
            RunStatus::SchemaSetupFailed(err) => write!(f, "{err}"),
            RunStatus::WorkloadFailed { test, error } => write!(f, "{test}: {error}"),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    /// Everything that completed, even when the run stopped early.
    pub report: RunReport,
    pub status: RunStatus,
    pub server: Option<ServerInfo>,
}

struct StepFailure {
    test: &'static str,
    error: BenchError,
}

trait ForTest<T> {
    fn for_test(self, test: &'static str) -> Result<T, StepFailure>;
}

impl<T> ForTest<T> for Result<T, BenchError> {
    fn for_test(self, test: &'static str) -> Result<T, StepFailure> {
        self.map_err(|error| StepFailure { test, error })
    }
}

pub struct Orchestrator<P> {
    config: Arc<BenchConfig>,
    pool: P,
    phase: Phase,
}

impl<P: ConnectionPool> Orchestrator<P> {
    pub fn new(config: Arc<BenchConfig>, pool: P) -> Self {
        Self {
            config,
            pool,
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Connects, pings and stops. Nothing is written.
    pub async fn check_connection(&mut self) -> Result<ServerInfo, BenchError> {
        self.transition(Phase::Connecting);
        let res = self.connect().await;
        match &res {
            Ok(_) => self.transition(Phase::Connected),
            Err(_) => self.transition(Phase::ConnectionFailed),
        }
        self.transition(Phase::Done);
        res
    }

    #[instrument(name = "run", skip_all, fields(label = %self.config.label))]
    pub async fn run(&mut self) -> RunOutcome {
        let config = self.config.clone();
        info!("Running {} against {}", config.label, config.connection.host);
        debug!("{:?}", config);
        debug!("Percentiles: {PERCENTILE_RULE}");
        self.warn_on_small_pool();

        self.transition(Phase::Connecting);
        let server = match self.connect().await {
            Ok(server) => server,
            Err(err) => {
                error!("{err}");
                self.transition(Phase::ConnectionFailed);
                self.transition(Phase::Done);
                return self.outcome(RunStatus::ConnectionFailed(err), None);
            }
        };
        self.transition(Phase::Connected);

        self.transition(Phase::SchemaSetup);
        if let Err(err) = self.setup_schema().await {
            error!("{err}");
            self.transition(Phase::Done);
            return self.outcome(RunStatus::SchemaSetupFailed(err), Some(server));
        }

        let mut report = self.new_report();
        let status = match self.run_tests(&mut report).await {
            Ok(()) => RunStatus::Completed,
            Err(StepFailure { test, error }) => {
                error!("{test} failed: {error}; skipping the remaining tests");
                report.push_failure(test, &error);
                RunStatus::WorkloadFailed { test, error }
            }
        };

        if config.cleanup {
            self.transition(Phase::Cleanup);
            self.cleanup().await;
        } else {
            info!("Keeping the test table");
        }
        self.transition(Phase::Done);

        info!("Run {status}");
        RunOutcome {
            report,
            status,
            server: Some(server),
        }
    }

    fn outcome(&self, status: RunStatus, server: Option<ServerInfo>) -> RunOutcome {
        RunOutcome {
            report: self.new_report(),
            status,
            server,
        }
    }

    fn new_report(&self) -> RunReport {
        RunReport::new(
            &self.config.label,
            &self.config.connection.host,
            &self.config.connection.database,
        )
    }

    fn transition(&mut self, next: Phase) {
        info!("Phase {} -> {}", self.phase, next);
        self.phase = next;
    }

    fn warn_on_small_pool(&self) {
        let threads = self.config.workload.threads;
        let size = self.config.pool.size as usize;
        if !self.config.skip_writes && threads > size {
            warn!(
                "{threads} concurrent writers share {size} pooled connections; writers without \
                 a connection wait up to {} and then fail",
                humantime::format_duration(self.config.pool.connect_timeout)
            );
        }
    }

    async fn connect(&self) -> Result<ServerInfo, BenchError> {
        let mut conn = self.pool.acquire().await.map_err(BenchError::from_acquire)?;
        let server = conn.ping().await.map_err(BenchError::ConnectionFailed)?;
        info!(
            "Connected to MySQL {} as {} (database {})",
            server.version,
            server.user,
            server.database.as_deref().unwrap_or("<none>")
        );
        match &server.ssl_cipher {
            Some(cipher) => info!("TLS cipher {cipher}"),
            None => debug!("Connection is not encrypted"),
        }
        Ok(server)
    }

    async fn setup_schema(&self) -> Result<(), BenchError> {
        let mut conn = self.acquire().await?;
        conn.create_table()
            .await
            .map_err(BenchError::SchemaSetupFailed)?;
        info!("Created the test table");
        Ok(())
    }

    async fn acquire(&self) -> Result<P::Conn, BenchError> {
        self.pool.acquire().await.map_err(BenchError::from_acquire)
    }

    async fn run_tests(&mut self, report: &mut RunReport) -> Result<(), StepFailure> {
        if self.config.skip_writes {
            info!("Skipping write tests");
        } else {
            self.transition(Phase::WriteTests);
            self.write_tests(report).await?;
        }

        if self.config.runs_reads() {
            self.transition(Phase::ReadSetup);
            let keys = self.populate_baseline().await.for_test(READ_SETUP)?;
            self.transition(Phase::ReadTests);
            self.read_tests(report, keys).await?;
        } else {
            info!("Skipping read tests");
        }
        Ok(())
    }

    async fn write_tests(&self, report: &mut RunReport) -> Result<(), StepFailure> {
        let w = &self.config.workload;

        if w.single_inserts > 0 {
            let test = "single_inserts";
            let mut conn = self.acquire().await.for_test(test)?;
            let res = sequential::run_inserts(&mut conn, w.single_inserts, w.commit_every).await;
            report.push_result(res.for_test(test)?);
        }

        if w.batch_count > 0 && w.batch_size > 0 {
            let test = "batch_inserts";
            let mut conn = self.acquire().await.for_test(test)?;
            let res = sequential::run_batch_inserts(&mut conn, w.batch_count, w.batch_size).await;
            report.push_result(res.for_test(test)?);
        }

        if w.threads > 0 && w.writes_per_thread > 0 {
            let res = concurrent::run_concurrent_inserts(
                &self.pool,
                w.threads,
                w.writes_per_thread,
                w.concurrent_commit_every,
            )
            .await;
            report.push_result(res.for_test("concurrent_writes")?);
        }

        if w.updates > 0 {
            let test = "updates";
            let mut conn = self.acquire().await.for_test(test)?;
            let keys = key_range(&mut conn, test).await.for_test(test)?;
            let res = sequential::run_updates(&mut conn, w.updates, keys).await;
            report.push_result(res.for_test(test)?);
        }

        Ok(())
    }

    /// Recreates the table with `1..=N` ids so every read hits an existing row.
    async fn populate_baseline(&self) -> Result<KeyRange, BenchError> {
        let rows = self.config.workload.baseline_rows();
        info!("Populating {rows} baseline rows");

        let mut conn = self.acquire().await?;
        conn.create_table()
            .await
            .map_err(BenchError::SchemaSetupFailed)?;

        let mut inserted = 0;
        while inserted < rows {
            let n = BASELINE_BATCH_SIZE.min(rows - inserted);
            let batch = (inserted..inserted + n)
                .map(|i| Row::generate("baseline_data", i, i as i64))
                .collect();
            conn.execute(Statement::InsertBatch(batch))
                .await
                .map_err(|cause| BenchError::OperationFailed {
                    test: READ_SETUP,
                    iteration: inserted,
                    cause,
                })?;
            inserted += n;
        }
        conn.commit()
            .await
            .map_err(|cause| BenchError::OperationFailed {
                test: READ_SETUP,
                iteration: inserted,
                cause,
            })?;

        let keys = key_range(&mut conn, READ_SETUP).await?;
        info!("Baseline ready with keys {keys}");
        Ok(keys)
    }

    async fn read_tests(&self, report: &mut RunReport, keys: KeyRange) -> Result<(), StepFailure> {
        let w = &self.config.workload;

        if w.read_queries > 0 {
            let test = "point_reads";
            let mut conn = self.acquire().await.for_test(test)?;
            let res = sequential::run_point_reads(&mut conn, w.read_queries, keys).await;
            report.push_result(res.for_test(test)?);
        }

        if w.range_queries > 0 {
            let test = "range_reads";
            let mut conn = self.acquire().await.for_test(test)?;
            let res =
                sequential::run_range_reads(&mut conn, w.range_queries, w.range_size, keys).await;
            report.push_result(res.for_test(test)?);
        }

        Ok(())
    }

    async fn cleanup(&self) {
        let dropped = match self.acquire().await {
            Ok(mut conn) => conn.drop_table().await.map_err(BenchError::ConnectionFailed),
            Err(err) => Err(err),
        };
        match dropped {
            Ok(()) => info!("Dropped the test table"),
            Err(err) => warn!("Unable to drop the test table: {err}"),
        }
    }
}

async fn key_range<C: Connection>(
    conn: &mut C,
    test: &'static str,
) -> Result<KeyRange, BenchError> {
    conn.key_range()
        .await
        .map_err(|cause: DbError| BenchError::OperationFailed {
            test,
            iteration: 0,
            cause,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbperf_core::{ConnectionConfig, WorkloadConfig};
    use mock_store::MockPool;
    use tracing_test::traced_test;

    fn config(workload: WorkloadConfig) -> Arc<BenchConfig> {
        let mut config = BenchConfig::new(ConnectionConfig::new("db.local", "bench", "secret"));
        config.workload = workload;
        Arc::new(config)
    }

    #[test]
    fn exit_codes() {
        let err = || BenchError::EmptyBaseline { test: "updates" };
        assert_eq!(RunStatus::Completed.exit_code(), 0);
        assert_eq!(RunStatus::ConnectionFailed(err()).exit_code(), 2);
        assert_eq!(
            RunStatus::WorkloadFailed {
                test: "updates",
                error: err()
            }
            .exit_code(),
            3
        );
        assert_eq!(RunStatus::SchemaSetupFailed(err()).exit_code(), 4);
    }

    #[traced_test]
    #[tokio::test]
    async fn runs_tests_in_order() {
        let workload = WorkloadConfig {
            single_inserts: 20,
            commit_every: 5,
            batch_count: 2,
            batch_size: 10,
            threads: 2,
            writes_per_thread: 5,
            concurrent_commit_every: 5,
            updates: 10,
            read_queries: 10,
            range_queries: 5,
            range_size: 20,
        };
        let pool = MockPool::new(4);
        let mut orchestrator = Orchestrator::new(config(workload), pool.clone());
        let outcome = orchestrator.run().await;

        assert!(outcome.status.is_success(), "{}", outcome.status);
        assert_eq!(orchestrator.phase(), Phase::Done);
        let names: Vec<_> = outcome
            .report
            .results()
            .iter()
            .map(|r| r.kind.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "single_inserts",
                "batch_inserts",
                "concurrent_writes",
                "updates",
                "point_reads",
                "range_reads"
            ]
        );
        assert!(!pool.table_exists());
        assert!(logs_contain("Phase ReadSetup -> ReadTests"));
    }

    #[tokio::test]
    async fn baseline_covers_the_widest_read() {
        let workload = WorkloadConfig {
            read_queries: 10,
            range_queries: 3,
            range_size: 2_500,
            ..WorkloadConfig::none()
        };
        let pool = MockPool::new(2);
        let mut config = (*config(workload)).clone();
        config.skip_writes = true;
        config.cleanup = false;
        let outcome = Orchestrator::new(Arc::new(config), pool.clone()).run().await;

        assert!(outcome.status.is_success(), "{}", outcome.status);
        assert_eq!(pool.rows().len(), 2_500);
        assert_eq!(pool.rows()[0].0, 1);
        assert!(pool.read_keys().iter().all(|id| (1..=2_500).contains(id)));
    }

    #[tokio::test]
    async fn updates_without_rows_fail() {
        let workload = WorkloadConfig {
            updates: 5,
            ..WorkloadConfig::none()
        };
        let pool = MockPool::new(2);
        let outcome = Orchestrator::new(config(workload), pool.clone()).run().await;

        match &outcome.status {
            RunStatus::WorkloadFailed { test, error } => {
                assert_eq!(*test, "updates");
                assert!(matches!(error, BenchError::EmptyBaseline { .. }));
            }
            other => panic!("unexpected status: {other}"),
        }
        assert_eq!(outcome.report.failures()[0].test, "updates");
    }

    #[tokio::test]
    async fn failure_skips_the_rest_but_still_cleans_up() {
        let workload = WorkloadConfig {
            single_inserts: 10,
            commit_every: 1,
            batch_count: 2,
            batch_size: 10,
            read_queries: 10,
            ..WorkloadConfig::none()
        };
        let pool = MockPool::builder()
            .fail_when(|s| matches!(s, Statement::InsertBatch(rows) if rows.len() == 10))
            .build();
        let outcome = Orchestrator::new(config(workload), pool.clone()).run().await;

        assert_eq!(outcome.status.exit_code(), 3);
        assert_eq!(outcome.report.results().len(), 1);
        assert!(outcome.report.result("single_inserts").is_some());
        assert_eq!(outcome.report.failures()[0].test, "batch_inserts");
        assert!(!pool.table_exists());
    }

    #[tokio::test]
    async fn unreachable_server() {
        let pool = MockPool::builder().unreachable().build();
        let mut orchestrator = Orchestrator::new(config(WorkloadConfig::default()), pool);
        let outcome = orchestrator.run().await;

        assert_eq!(outcome.status.exit_code(), 2);
        assert!(outcome.report.results().is_empty());
        assert!(outcome.server.is_none());
    }

    #[tokio::test]
    async fn check_connection_writes_nothing() {
        let pool = MockPool::new(1);
        let mut orchestrator = Orchestrator::new(config(WorkloadConfig::default()), pool.clone());
        let info = orchestrator.check_connection().await.unwrap();

        assert_eq!(info.database.as_deref(), Some("perftest"));
        assert_eq!(pool.statements(), 0);
        assert_eq!(orchestrator.phase(), Phase::Done);
    }
}
