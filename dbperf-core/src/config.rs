use crate::{
    ConfigError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DATABASE, DEFAULT_LABEL, DEFAULT_POOL_SIZE,
    DEFAULT_PORT, MAX_BATCH_SIZE,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Every tunable of a benchmark run.
///
/// Built once at startup (usually from the CLI and environment) and shared read-only by all
/// runners afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchConfig {
    pub label: String,
    pub connection: ConnectionConfig,
    pub pool: PoolConfig,
    pub workload: WorkloadConfig,
    pub skip_writes: bool,
    pub skip_reads: bool,
    /// Drop the test table once the run is over.
    pub cleanup: bool,
}

impl BenchConfig {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            connection,
            pool: PoolConfig::default(),
            workload: WorkloadConfig::default(),
            skip_writes: false,
            skip_reads: false,
            cleanup: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.host.is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.connection.user.is_empty() {
            return Err(ConfigError::Missing("user"));
        }
        if self.pool.size == 0 {
            return Err(ConfigError::Zero("pool_size"));
        }
        self.workload.validate()
    }

    /// Whether the read phase has anything to do.
    pub fn runs_reads(&self) -> bool {
        !self.skip_reads && (self.workload.read_queries > 0 || self.workload.range_queries > 0)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub database: String,
    pub tls: Option<TlsConfig>,
}

impl ConnectionConfig {
    pub fn new(host: &str, user: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            user: user.to_string(),
            password: password.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            tls: None,
        }
    }
}

// NOTE: Hand-written so the password never ends up in logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("tls", &self.tls)
            .finish()
    }
}

/// Certificate material for encrypted connections. Any subset may be provided.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl TlsConfig {
    /// `None` when no material was supplied at all.
    pub fn from_paths(
        ca: Option<PathBuf>,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
    ) -> Option<Self> {
        if ca.is_none() && cert.is_none() && key.is_none() {
            None
        } else {
            Some(Self { ca, cert, key })
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub size: u32,
    /// Upper bound on connecting and on waiting for a free pooled connection.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl fmt::Display for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={}, timeout={}",
            self.size,
            humantime::format_duration(self.connect_timeout)
        )
    }
}

/// Operation counts for each test. A count of zero skips that test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub single_inserts: u64,
    pub commit_every: u64,
    pub batch_count: u64,
    pub batch_size: u64,
    pub threads: usize,
    pub writes_per_thread: u64,
    pub concurrent_commit_every: u64,
    pub updates: u64,
    pub read_queries: u64,
    pub range_queries: u64,
    pub range_size: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            single_inserts: 1_000,
            commit_every: 1,
            batch_count: 100,
            batch_size: 100,
            threads: 10,
            writes_per_thread: 100,
            concurrent_commit_every: 10,
            updates: 1_000,
            read_queries: 1_000,
            range_queries: 100,
            range_size: 100,
        }
    }
}

impl WorkloadConfig {
    /// A workload with every count at zero. Handy as a base for struct update syntax.
    pub fn none() -> Self {
        Self {
            single_inserts: 0,
            commit_every: 1,
            batch_count: 0,
            batch_size: 1,
            threads: 0,
            writes_per_thread: 0,
            concurrent_commit_every: 1,
            updates: 0,
            read_queries: 0,
            range_queries: 0,
            range_size: 1,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit_every == 0 {
            return Err(ConfigError::Zero("commit_every"));
        }
        if self.concurrent_commit_every == 0 {
            return Err(ConfigError::Zero("concurrent_commit_every"));
        }
        if self.batch_count > 0 && self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.batch_count > 0 && self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::TooLarge {
                setting: "batch_size",
                max: MAX_BATCH_SIZE,
            });
        }
        if self.range_queries > 0 && self.range_size == 0 {
            return Err(ConfigError::Zero("range_size"));
        }
        Ok(())
    }

    /// Rows inserted before the read tests so that every read hits real data.
    pub fn baseline_rows(&self) -> u64 {
        let range = if self.range_queries > 0 {
            self.range_size
        } else {
            0
        };
        self.read_queries.max(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BenchConfig {
        BenchConfig::new(ConnectionConfig::new("localhost", "root", "secret"))
    }

    #[test]
    fn defaults_validate() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.database, "perftest");
        assert_eq!(config.pool.size, 10);
        assert!(config.cleanup);
    }

    #[test]
    fn rejects_zero_commit_interval() {
        let mut config = config();
        config.workload.commit_every = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("commit_every")));
    }

    #[test]
    fn rejects_missing_host() {
        let config = BenchConfig::new(ConnectionConfig::new("", "root", "secret"));
        assert_eq!(config.validate(), Err(ConfigError::Missing("host")));
    }

    #[test]
    fn zero_batch_size_only_matters_with_batches() {
        let mut config = config();
        config.workload.batch_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("batch_size")));

        config.workload.batch_count = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn batch_size_fits_one_statement() {
        let mut config = config();
        config.workload.batch_size = MAX_BATCH_SIZE;
        assert!(config.validate().is_ok());

        config.workload.batch_size = 30_000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooLarge {
                setting: "batch_size",
                max: 21_845,
            })
        );
    }

    #[test]
    fn baseline_covers_reads_and_ranges() {
        let workload = WorkloadConfig {
            read_queries: 50,
            range_queries: 3,
            range_size: 200,
            ..WorkloadConfig::none()
        };
        assert_eq!(workload.baseline_rows(), 200);

        let workload = WorkloadConfig {
            read_queries: 50,
            range_size: 200,
            ..WorkloadConfig::none()
        };
        assert_eq!(workload.baseline_rows(), 50);
    }

    #[test]
    fn password_is_redacted() {
        let config = config();
        let debug = format!("{:?}", config.connection);
        assert!(!debug.contains("secret"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"connect_timeout\":10"));
    }
}
