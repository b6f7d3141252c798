use anyhow::{bail, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use dbperf::compare::DEFAULT_THRESHOLD;
use dbperf::core::{
    BenchConfig, ConnectionConfig, PoolConfig, TlsConfig, WorkloadConfig, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_DATABASE, DEFAULT_LABEL, DEFAULT_POOL_SIZE, DEFAULT_PORT,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "dbperf", version, about = "Benchmark MySQL-compatible databases")]
pub struct Cli {
    /// More logging; repeat for more detail. Overrides `RUST_LOG`.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the benchmark suite against one server
    Run(RunArgs),
    /// Compare two result files
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long, env = "MYSQL_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "MYSQL_USER")]
    pub user: Option<String>,

    /// Falls back to `MYSQL_PASSWORD` when `MYSQL_PASS` is unset.
    #[arg(long = "pass", env = "MYSQL_PASS", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, env = "MYSQL_DB", default_value = DEFAULT_DATABASE)]
    pub db: String,

    #[arg(long, env = "MYSQL_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Name for this server in reports
    #[arg(long, default_value = DEFAULT_LABEL)]
    pub label: String,

    #[arg(long)]
    pub ssl_ca: Option<PathBuf>,

    #[arg(long)]
    pub ssl_cert: Option<PathBuf>,

    #[arg(long)]
    pub ssl_key: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: u32,

    /// Seconds to wait for a connection
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub connect_timeout: u64,

    #[arg(long, default_value_t = 1000)]
    pub single_inserts: u64,

    #[arg(long, default_value_t = 1)]
    pub commit_every: u64,

    #[arg(long, default_value_t = 100)]
    pub batch_count: u64,

    #[arg(long, default_value_t = 100)]
    pub batch_size: u64,

    #[arg(long, default_value_t = 10)]
    pub threads: usize,

    #[arg(long, default_value_t = 100)]
    pub writes_per_thread: u64,

    #[arg(long, default_value_t = 10)]
    pub concurrent_commit_every: u64,

    /// Defaults to `--single-inserts`
    #[arg(long)]
    pub updates: Option<u64>,

    #[arg(long, default_value_t = 1000)]
    pub read_queries: u64,

    #[arg(long, default_value_t = 100)]
    pub range_queries: u64,

    #[arg(long, default_value_t = 100)]
    pub range_size: u64,

    #[arg(long)]
    pub skip_writes: bool,

    #[arg(long)]
    pub skip_reads: bool,

    /// Connect, print server details and exit
    #[arg(long)]
    pub test_connection_only: bool,

    /// Report file (default: output/dbperf_<label>_<timestamp>.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep the test table after the run
    #[arg(long)]
    pub no_cleanup: bool,

    /// Serve Prometheus metrics on this address while running
    #[arg(long)]
    pub prometheus: Option<SocketAddr>,
}

impl RunArgs {
    pub fn to_config(&self) -> Result<BenchConfig> {
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var("MYSQL_PASSWORD").ok());
        let (Some(host), Some(user), Some(password)) = (&self.host, &self.user, password) else {
            bail!(
                "--host, --user and --pass are required \
                 (or set MYSQL_HOST, MYSQL_USER and MYSQL_PASS)"
            );
        };

        let mut connection = ConnectionConfig::new(host, user, &password);
        connection.port = self.port;
        connection.database = self.db.clone();
        connection.tls = TlsConfig::from_paths(
            self.ssl_ca.clone(),
            self.ssl_cert.clone(),
            self.ssl_key.clone(),
        );

        let mut config = BenchConfig::new(connection);
        config.label = self.label.clone();
        config.pool = PoolConfig {
            size: self.pool_size,
            connect_timeout: Duration::from_secs(self.connect_timeout),
        };
        config.workload = WorkloadConfig {
            single_inserts: self.single_inserts,
            commit_every: self.commit_every,
            batch_count: self.batch_count,
            batch_size: self.batch_size,
            threads: self.threads,
            writes_per_thread: self.writes_per_thread,
            concurrent_commit_every: self.concurrent_commit_every,
            updates: self.updates.unwrap_or(self.single_inserts),
            read_queries: self.read_queries,
            range_queries: self.range_queries,
            range_size: self.range_size,
        };
        config.skip_writes = self.skip_writes;
        config.skip_reads = self.skip_reads;
        config.cleanup = !self.no_cleanup;

        config.validate()?;
        Ok(config)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Table,
    Markdown,
    Json,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    pub file1: PathBuf,
    pub file2: PathBuf,

    #[arg(long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Write to a file; bare names go under `output/`
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub label1: Option<String>,

    #[arg(long)]
    pub label2: Option<String>,

    /// Smallest difference, in percent, that names a winner
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,
}
