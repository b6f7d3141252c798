use std::time::Duration;

/// Table every workload reads from and writes to.
pub const TABLE_NAME: &str = "perf_test_writes";

pub const DEFAULT_DATABASE: &str = "perftest";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_LABEL: &str = "MySQL";

pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest batch a single multi-row insert can carry. Each row binds three parameters and
/// MySQL caps a prepared statement at 65535 placeholders.
pub const MAX_BATCH_SIZE: u64 = 65_535 / 3;

/// Rows per statement when populating the read baseline.
pub const BASELINE_BATCH_SIZE: u64 = 1_000;

/// Seed for the range-read window picker, so two runs with the same config issue the same
/// queries.
pub const RANGE_READ_SEED: u64 = 0x5EED_DB;

/// Progress is logged each time another `1 / PROGRESS_FRACTION` of a test completes.
pub const PROGRESS_FRACTION: u64 = 10;
