//! An in-memory stand-in for a MySQL server, for exercising the benchmark engine without one.
//!
//! Connections are bounded by a semaphore the same way a real pool bounds them, statements can
//! be slowed down or made to fail, and every commit and key touched is counted.
use dbperf_core::{Connection, ConnectionPool, DbError, KeyRange, Row, ServerInfo, Statement};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

const DEFAULT_SIZE: usize = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const MOCK_VERSION: &str = "8.0.36-mock";

type FailFn = Arc<dyn Fn(&Statement) -> bool + Send + Sync>;

pub struct MockStoreBuilder {
    size: usize,
    acquire_timeout: Duration,
    op_delay: Duration,
    unreachable: bool,
    fail_when: Option<FailFn>,
    fail_commits: bool,
    database: String,
}

impl Default for MockStoreBuilder {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            op_delay: Duration::ZERO,
            unreachable: false,
            fail_when: None,
            fail_commits: false,
            database: "perftest".to_string(),
        }
    }
}

impl MockStoreBuilder {
    /// Maximum number of connections out at once.
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Time every statement spends "on the server".
    pub fn op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = delay;
        self
    }

    /// Every `acquire` fails as if the server refused the connection.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Statements matching `pred` fail instead of executing.
    pub fn fail_when<F>(mut self, pred: F) -> Self
    where
        F: Fn(&Statement) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Arc::new(pred));
        self
    }

    pub fn fail_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn build(self) -> MockPool {
        MockPool {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(self.size)),
                acquire_timeout: self.acquire_timeout,
                op_delay: self.op_delay,
                unreachable: self.unreachable,
                fail_when: self.fail_when,
                fail_commits: self.fail_commits,
                database: self.database,
                table: Mutex::new(Some(Table::default())),
                stats: Stats::default(),
            }),
        }
    }
}

#[derive(Default)]
struct Table {
    next_id: u64,
    rows: BTreeMap<u64, Row>,
}

impl Table {
    fn insert(&mut self, row: Row) {
        self.next_id += 1;
        self.rows.insert(self.next_id, row);
    }

    fn key_range(&self) -> KeyRange {
        KeyRange::from_bounds(
            self.rows.keys().next().copied(),
            self.rows.keys().next_back().copied(),
        )
    }
}

#[derive(Default)]
struct Stats {
    statements: AtomicU64,
    commits: AtomicU64,
    acquired: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    read_keys: Mutex<Vec<u64>>,
}

struct Inner {
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    op_delay: Duration,
    unreachable: bool,
    fail_when: Option<FailFn>,
    fail_commits: bool,
    database: String,
    table: Mutex<Option<Table>>,
    stats: Stats,
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, Option<Table>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, statement: Statement) -> Result<u64, DbError> {
        let mut guard = self.table();
        let table = guard
            .as_mut()
            .ok_or_else(|| DbError::Statement("table perf_test_writes doesn't exist".into()))?;

        let affected = match statement {
            Statement::Insert(row) => {
                table.insert(row);
                1
            }
            Statement::InsertBatch(rows) => {
                let n = rows.len() as u64;
                rows.into_iter().for_each(|row| table.insert(row));
                n
            }
            Statement::Update { id, test_data } => match table.rows.get_mut(&id) {
                Some(row) => {
                    row.test_data = test_data;
                    1
                }
                None => 0,
            },
            Statement::PointRead { id } => {
                self.note_read(&[id]);
                u64::from(table.rows.contains_key(&id))
            }
            Statement::RangeRead { first, last } => {
                self.note_read(&[first, last]);
                table.rows.range(first..=last).count() as u64
            }
        };
        Ok(affected)
    }

    fn note_read(&self, keys: &[u64]) {
        self.stats
            .read_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(keys);
    }
}

/// A cloneable handle; clones share connections, the table and the counters.
#[derive(Clone)]
pub struct MockPool {
    inner: Arc<Inner>,
}

impl MockPool {
    pub fn builder() -> MockStoreBuilder {
        MockStoreBuilder::default()
    }

    pub fn new(size: usize) -> Self {
        Self::builder().size(size).build()
    }

    pub fn commits(&self) -> u64 {
        self.inner.stats.commits.load(Ordering::Relaxed)
    }

    /// Statements executed successfully.
    pub fn statements(&self) -> u64 {
        self.inner.stats.statements.load(Ordering::Relaxed)
    }

    /// Connections handed out so far.
    pub fn acquired(&self) -> u64 {
        self.inner.stats.acquired.load(Ordering::Relaxed)
    }

    /// Most statements ever executing at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.stats.max_in_flight.load(Ordering::Relaxed)
    }

    /// Every id named by a point read, and both bounds of every range read.
    pub fn read_keys(&self) -> Vec<u64> {
        self.inner
            .stats
            .read_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn rows(&self) -> Vec<(u64, Row)> {
        self.inner
            .table()
            .as_ref()
            .map(|t| t.rows.iter().map(|(id, row)| (*id, row.clone())).collect())
            .unwrap_or_default()
    }

    pub fn table_exists(&self) -> bool {
        self.inner.table().is_some()
    }

    /// Connections currently free.
    pub fn idle(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

impl ConnectionPool for MockPool {
    type Conn = MockConnection;

    async fn acquire(&self) -> Result<MockConnection, DbError> {
        if self.inner.unreachable {
            return Err(DbError::Connect(
                "Can't connect to MySQL server (mock unreachable)".into(),
            ));
        }

        let acquire = self.inner.permits.clone().acquire_owned();
        let permit = match tokio::time::timeout(self.inner.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DbError::Connect("pool is closed".into())),
            Err(_) => {
                debug!("Acquire timed out after {:?}", self.inner.acquire_timeout);
                return Err(DbError::PoolTimeout(self.inner.acquire_timeout));
            }
        };

        self.inner.stats.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(MockConnection {
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    async fn close(&self) {
        self.inner.permits.close();
    }
}

/// Holds one permit of its pool until dropped.
pub struct MockConnection {
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl Connection for MockConnection {
    async fn execute(&mut self, statement: Statement) -> Result<u64, DbError> {
        let stats = &self.inner.stats;
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.inner.op_delay.is_zero() {
            tokio::time::sleep(self.inner.op_delay).await;
        }

        let failed = self
            .inner
            .fail_when
            .as_ref()
            .is_some_and(|pred| pred(&statement));
        trace!("{} failed={failed}", statement.name());

        let res = if failed {
            Err(DbError::Statement(format!(
                "injected failure on {}",
                statement.name()
            )))
        } else {
            self.inner.apply(statement)
        };

        stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        if res.is_ok() {
            stats.statements.fetch_add(1, Ordering::Relaxed);
        }
        res
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        if self.inner.fail_commits {
            return Err(DbError::Statement("injected commit failure".into()));
        }
        self.inner.stats.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn ping(&mut self) -> Result<ServerInfo, DbError> {
        Ok(ServerInfo {
            version: MOCK_VERSION.to_string(),
            database: Some(self.inner.database.clone()),
            user: "bench@localhost".to_string(),
            ssl_cipher: None,
        })
    }

    async fn create_table(&mut self) -> Result<(), DbError> {
        *self.inner.table() = Some(Table::default());
        Ok(())
    }

    async fn drop_table(&mut self) -> Result<(), DbError> {
        *self.inner.table() = None;
        Ok(())
    }

    async fn key_range(&mut self) -> Result<KeyRange, DbError> {
        Ok(self
            .inner
            .table()
            .as_ref()
            .map_or(KeyRange::EMPTY, Table::key_range))
    }
}
