mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use dbperf::concurrent::run_concurrent_inserts;
    use dbperf::core::{Connection, ConnectionPool, KeyRange, Row, Statement};
    use dbperf::sequential::{run_inserts, run_point_reads, run_range_reads};
    use dbperf::BenchError;
    use mock_store::MockPool;
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    async fn baseline(pool: &MockPool, rows: u64) -> KeyRange {
        let mut conn = pool.acquire().await.unwrap();
        conn.create_table().await.unwrap();
        let batch = (0..rows)
            .map(|i| Row::generate("baseline_data", i, i as i64))
            .collect();
        conn.execute(Statement::InsertBatch(batch)).await.unwrap();
        conn.commit().await.unwrap();
        conn.key_range().await.unwrap()
    }

    #[traced_test]
    #[tokio::test]
    async fn commit_batching() {
        for (commit_every, commits) in [(10, 10), (1, 100), (7, 15), (100, 1), (1_000, 1)] {
            let pool = MockPool::new(1);
            let mut conn = pool.acquire().await.unwrap();
            let result = run_inserts(&mut conn, 100, commit_every).await.unwrap();

            assert_eq!(result.count, 100);
            assert_eq!(pool.commits(), commits, "commit_every={commit_every}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10000)]
    async fn concurrent_samples_are_merged() {
        let pool = MockPool::new(5);
        let result = run_concurrent_inserts(&pool, 5, 20, 10).await.unwrap();

        assert_eq!(result.count, 100);
        assert_eq!(pool.statements(), 100);
        // One connection per worker, all returned after the join.
        assert_eq!(pool.acquired(), 5);
        assert_eq!(pool.idle(), 5);
        assert!(result.stats.min <= result.stats.median);
        assert!(result.stats.median <= result.stats.max);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10000)]
    async fn workers_run_in_parallel() {
        let delay = Duration::from_millis(50);
        let pool = MockPool::builder().size(5).op_delay(delay).build();

        let start = Instant::now();
        let result = run_concurrent_inserts(&pool, 5, 4, 1).await.unwrap();
        let wall = start.elapsed();

        // Serially this would take 20 delays.
        assert!(wall >= delay * 4, "{wall:?}");
        assert!(wall < delay * 12, "{wall:?}");
        assert!(result.elapsed <= wall);
        assert!(pool.max_in_flight() > 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10000)]
    async fn one_failing_worker_fails_the_test() {
        let pool = MockPool::builder()
            .size(5)
            .fail_when(|s| matches!(s, Statement::Insert(r) if r.test_data.starts_with("thread_3_")))
            .build();

        let err = run_concurrent_inserts(&pool, 5, 10, 1).await.unwrap_err();
        assert!(
            matches!(err, BenchError::WorkerFailed { worker: 3, .. }),
            "{err}"
        );
        assert!(err.to_string().contains("worker 3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10000)]
    async fn too_many_workers_exhaust_the_pool() {
        let pool = MockPool::builder()
            .size(2)
            .acquire_timeout(Duration::from_millis(100))
            .op_delay(Duration::from_millis(30))
            .build();

        let err = run_concurrent_inserts(&pool, 4, 10, 1).await.unwrap_err();
        let BenchError::WorkerFailed { cause, .. } = err else {
            panic!("expected a worker failure, got {err}");
        };
        assert!(matches!(*cause, BenchError::PoolExhausted(_)));
    }

    #[tokio::test]
    async fn reads_only_touch_existing_keys() {
        let pool = MockPool::new(1);
        let keys = baseline(&pool, 250).await;
        assert_eq!(keys, KeyRange::new(1, 250));

        let mut conn = pool.acquire().await.unwrap();
        run_point_reads(&mut conn, 1_000, keys).await.unwrap();
        run_range_reads(&mut conn, 100, 100, keys).await.unwrap();

        let touched = pool.read_keys();
        assert_eq!(touched.len(), 1_000 + 200);
        assert!(touched.iter().all(|&id| keys.contains(id)));
    }

    #[tokio::test]
    async fn reads_need_a_baseline() {
        let pool = MockPool::new(1);
        let keys = baseline(&pool, 0).await;
        let mut conn = pool.acquire().await.unwrap();

        let err = run_point_reads(&mut conn, 10, keys).await.unwrap_err();
        assert!(matches!(err, BenchError::EmptyBaseline { .. }));
        assert!(pool.read_keys().is_empty());
    }
}
