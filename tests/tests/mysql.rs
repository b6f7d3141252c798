mod utils;
#[allow(unused)]
use utils::*;

// Needs a disposable MySQL server: MYSQL_HOST, MYSQL_USER, MYSQL_PASS and optionally MYSQL_DB.
#[cfg(feature = "integration")]
mod tests {
    use super::*;
    use dbperf::core::{ConnectionConfig, ConnectionPool, WorkloadConfig};
    use dbperf::mysql::MySqlStore;
    use dbperf::Orchestrator;

    fn live_config() -> dbperf::core::BenchConfig {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let mut config = quiet_config();
        config.label = "Live".to_string();
        config.connection = ConnectionConfig::new(
            &var("MYSQL_HOST"),
            &var("MYSQL_USER"),
            &var("MYSQL_PASS"),
        );
        if let Ok(db) = std::env::var("MYSQL_DB") {
            config.connection.database = db;
        }
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(120000)]
    async fn small_suite_against_mysql() {
        init();
        let mut config = live_config();
        config.workload = WorkloadConfig {
            single_inserts: 100,
            commit_every: 10,
            batch_count: 5,
            batch_size: 50,
            threads: 4,
            writes_per_thread: 25,
            concurrent_commit_every: 5,
            updates: 50,
            read_queries: 100,
            range_queries: 10,
            range_size: 20,
        };

        let store = MySqlStore::new(&config.connection, &config.pool);
        let outcome = Orchestrator::new(shared(config), store.clone()).run().await;
        store.close().await;

        assert!(outcome.status.is_success(), "{}", outcome.status);
        assert_eq!(outcome.report.results().len(), 6);
        assert_eq!(outcome.report.result("batch_inserts").unwrap().count, 250);
        assert_eq!(outcome.report.result("concurrent_writes").unwrap().count, 100);
    }

    #[tokio::test]
    #[ntest::timeout(60000)]
    async fn connection_check() {
        init();
        let config = live_config();
        let store = MySqlStore::new(&config.connection, &config.pool);
        let server = Orchestrator::new(shared(config), store)
            .check_connection()
            .await
            .unwrap();
        assert!(!server.version.is_empty());
    }
}
