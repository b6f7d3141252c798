//! The contract the benchmark engine needs from a database.
//!
//! A pool hands out connections; a connection executes typed [`Statement`]s against the fixed
//! benchmark table and commits. Dropping a connection returns it to its pool.
use crate::DbError;
use std::fmt;
use std::future::Future;
use time::OffsetDateTime;

const TIMESTAMP_BASE_SECS: i64 = 1_700_000_000;
const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// One generated row of the benchmark table. The primary key is assigned by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub test_data: String,
    pub numeric_value: i64,
    pub recorded_at: OffsetDateTime,
}

impl Row {
    /// Deterministic payload for iteration `index`. `tag` distinguishes the producing test.
    pub fn generate(tag: &str, index: u64, numeric_value: i64) -> Self {
        let offset = (index % SECONDS_PER_YEAR) as i64;
        Self {
            test_data: format!("{tag}_{index}"),
            numeric_value,
            recorded_at: OffsetDateTime::UNIX_EPOCH
                + time::Duration::seconds(TIMESTAMP_BASE_SECS + offset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert(Row),
    InsertBatch(Vec<Row>),
    Update { id: u64, test_data: String },
    PointRead { id: u64 },
    /// Inclusive on both ends.
    RangeRead { first: u64, last: u64 },
}

impl Statement {
    pub fn name(&self) -> &'static str {
        match self {
            Statement::Insert(_) => "insert",
            Statement::InsertBatch(_) => "insert_batch",
            Statement::Update { .. } => "update",
            Statement::PointRead { .. } => "point_read",
            Statement::RangeRead { .. } => "range_read",
        }
    }
}

/// An inclusive window of primary keys known to exist. May be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    first: u64,
    last: u64,
}

impl KeyRange {
    pub const EMPTY: KeyRange = KeyRange { first: 1, last: 0 };

    pub fn new(first: u64, last: u64) -> Self {
        Self { first, last }
    }

    /// Builds a range from `MIN(id)`/`MAX(id)` style bounds; either being absent means no rows.
    pub fn from_bounds(min: Option<u64>, max: Option<u64>) -> Self {
        match (min, max) {
            (Some(first), Some(last)) if first <= last => Self { first, last },
            _ => Self::EMPTY,
        }
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }

    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.last - self.first + 1
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        id >= self.first && id <= self.last
    }

    /// The `n`th key, wrapping around once the end is reached.
    ///
    /// NOTE: Panics on an empty range.
    pub fn nth_wrapping(&self, n: u64) -> u64 {
        self.first + n % self.len()
    }

    /// How many distinct windows of `size` keys fit in the range. Offsets below this are all
    /// valid arguments to [`KeyRange::window`].
    pub fn window_starts(&self, size: u64) -> u64 {
        let size = size.clamp(1, self.len().max(1));
        self.len().saturating_sub(size) + 1
    }

    /// A window of at most `size` keys whose start is `offset` keys into the range. The window
    /// is shifted left so it never runs past the end, and clipped when the range is smaller.
    pub fn window(&self, offset: u64, size: u64) -> (u64, u64) {
        let size = size.clamp(1, self.len().max(1));
        let max_start = self.len().saturating_sub(size);
        let start = self.first + offset.min(max_start);
        (start, start + size - 1)
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "[]")
        } else {
            write!(f, "[{}, {}]", self.first, self.last)
        }
    }
}

/// What the server reports about itself during the connection check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub version: String,
    pub database: Option<String>,
    pub user: String,
    pub ssl_cipher: Option<String>,
}

#[trait_variant::make(Connection: Send)]
pub trait LocalConnection {
    /// Rows affected by a write, or rows returned by a read.
    async fn execute(&mut self, statement: Statement) -> Result<u64, DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn ping(&mut self) -> Result<ServerInfo, DbError>;

    /// Drops any previous benchmark table and creates an empty one.
    async fn create_table(&mut self) -> Result<(), DbError>;

    async fn drop_table(&mut self) -> Result<(), DbError>;

    /// The committed primary-key range currently in the table.
    async fn key_range(&mut self) -> Result<KeyRange, DbError>;
}

/// A bounded set of connections.
///
/// `acquire` waits for a free connection up to the pool's timeout and then fails with
/// [`DbError::PoolTimeout`].
pub trait ConnectionPool: Clone + Send + Sync + 'static {
    type Conn: Connection + Send + 'static;

    fn acquire(&self) -> impl Future<Output = Result<Self::Conn, DbError>> + Send;

    /// Releases every idle connection. Outstanding connections are closed as they come back.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
