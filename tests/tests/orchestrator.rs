mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use dbperf::compare::{Comparison, Winner, DEFAULT_THRESHOLD};
    use dbperf::core::{Statement, WorkloadConfig};
    use dbperf::report::{write_report, StoredReport};
    use dbperf::{Orchestrator, Phase, RunStatus};
    use mock_store::MockPool;
    use serde_json::Value;

    #[tokio::test]
    async fn single_inserts_only() {
        init();
        let mut config = quiet_config();
        config.workload = WorkloadConfig {
            single_inserts: 50,
            commit_every: 5,
            ..WorkloadConfig::none()
        };
        config.skip_reads = true;

        let pool = MockPool::new(2);
        let outcome = Orchestrator::new(shared(config), pool.clone()).run().await;
        assert!(outcome.status.is_success(), "{}", outcome.status);
        assert_eq!(pool.commits(), 10);

        let json = serde_json::to_value(&outcome.report).unwrap();
        let results = json["results"].as_object().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results["single_inserts"]["records"], 50);
        assert_eq!(results["single_inserts"]["commit_every"], 5);
        assert!(json.get("failures").is_none());
        assert_eq!(json["label"], "Mock");
    }

    #[tokio::test]
    async fn unreachable_server_exits_with_two() {
        init();
        let mut config = quiet_config();
        config.workload = WorkloadConfig::default();

        let pool = MockPool::builder().unreachable().build();
        let mut orchestrator = Orchestrator::new(shared(config), pool);
        let outcome = orchestrator.run().await;

        assert!(matches!(outcome.status, RunStatus::ConnectionFailed(_)));
        assert_eq!(outcome.status.exit_code(), 2);
        assert!(outcome.report.results().is_empty());
        assert_eq!(orchestrator.phase(), Phase::Done);
    }

    #[tokio::test]
    async fn connection_check_writes_nothing() {
        init();
        let pool = MockPool::builder().database("bench_eu").build();
        let mut orchestrator = Orchestrator::new(shared(quiet_config()), pool.clone());

        let server = orchestrator.check_connection().await.unwrap();
        assert_eq!(server.database.as_deref(), Some("bench_eu"));
        assert_eq!(orchestrator.phase(), Phase::Done);
        assert_eq!(pool.statements(), 0);
        assert_eq!(pool.commits(), 0);
        assert!(pool.rows().is_empty());
    }

    #[tokio::test]
    async fn read_phase_only() {
        init();
        let mut config = quiet_config();
        config.workload = WorkloadConfig {
            read_queries: 200,
            range_queries: 20,
            range_size: 50,
            ..WorkloadConfig::none()
        };
        config.skip_writes = true;
        config.cleanup = false;

        let pool = MockPool::new(2);
        let outcome = Orchestrator::new(shared(config), pool.clone()).run().await;
        assert!(outcome.status.is_success(), "{}", outcome.status);

        let names: Vec<_> = outcome
            .report
            .results()
            .iter()
            .map(|r| r.kind.name())
            .collect();
        assert_eq!(names, vec!["point_reads", "range_reads"]);
        assert_eq!(pool.rows().len(), 200);
        assert!(pool.table_exists());
        assert!(pool.read_keys().iter().all(|id| (1..=200).contains(id)));
    }

    #[tokio::test]
    async fn failed_test_is_reported_and_table_dropped() {
        init();
        let mut config = quiet_config();
        config.workload = WorkloadConfig {
            single_inserts: 10,
            updates: 10,
            ..WorkloadConfig::none()
        };

        let pool = MockPool::builder()
            .fail_when(|s| matches!(s, Statement::Update { .. }))
            .build();
        let outcome = Orchestrator::new(shared(config), pool.clone()).run().await;

        assert_eq!(outcome.status.exit_code(), 3);
        let json = serde_json::to_value(&outcome.report).unwrap();
        assert!(json["results"]["single_inserts"].is_object());
        assert_eq!(json["failures"][0]["test"], "updates");
        assert!(json["failures"][0]["error"]
            .as_str()
            .unwrap()
            .contains("iteration 0"));
        assert!(!pool.table_exists());
    }

    #[tokio::test]
    async fn reports_round_trip_into_comparisons() {
        init();
        let mut config = quiet_config();
        config.workload = WorkloadConfig {
            single_inserts: 20,
            read_queries: 20,
            ..WorkloadConfig::none()
        };

        let outcome = Orchestrator::new(shared(config), MockPool::new(2))
            .run()
            .await;
        assert!(outcome.status.is_success(), "{}", outcome.status);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mock.json");
        write_report(&outcome.report, &path).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["results"]["point_reads"]["qps"].is_number());

        let stored = StoredReport::load(&path).unwrap();
        let comparison = Comparison::new(&stored, &stored, (None, None), DEFAULT_THRESHOLD);
        assert_eq!(comparison.tests.len(), 2);
        assert!(comparison
            .tests
            .iter()
            .flat_map(|t| &t.metrics)
            .all(|m| m.winner == Winner::Neither && m.difference_pct == 0.));
    }
}
