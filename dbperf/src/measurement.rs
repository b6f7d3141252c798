use dbperf_core::DbError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
const LATENCY: &str = "dbperf_latency_ms";
#[cfg(feature = "metrics")]
const SUCCESS: &str = "dbperf_operations_total";
#[cfg(feature = "metrics")]
const ERROR: &str = "dbperf_errors_total";
#[cfg(feature = "metrics")]
const COMMITS: &str = "dbperf_commits_total";

/// Times one operation of `test`.
///
/// Also feeds the `metrics` facade when that feature is on. Without an installed recorder this
/// is a no-op.
pub(crate) async fn measure<T, R>(test: &'static str, op: T) -> (Result<R, DbError>, Duration)
where
    T: Future<Output = Result<R, DbError>>,
{
    let start = Instant::now();
    let res = op.await;
    let elapsed = start.elapsed();

    #[cfg(feature = "metrics")]
    {
        metrics::histogram!(LATENCY, "test" => test).record(elapsed.as_secs_f64() * 1_000.);
        if res.is_ok() {
            metrics::counter!(SUCCESS, "test" => test).increment(1);
        } else {
            metrics::counter!(ERROR, "test" => test).increment(1);
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = test;

    (res, elapsed)
}

pub(crate) fn committed(test: &'static str) {
    #[cfg(feature = "metrics")]
    metrics::counter!(COMMITS, "test" => test).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = test;
}

/// Registers descriptions for every metric emitted by the runners.
#[cfg(feature = "metrics")]
pub fn describe_metrics() {
    metrics::describe_histogram!(
        LATENCY,
        metrics::Unit::Milliseconds,
        "Latency of one timed operation"
    );
    metrics::describe_counter!(SUCCESS, "Timed operations that succeeded");
    metrics::describe_counter!(ERROR, "Timed operations that failed");
    metrics::describe_counter!(COMMITS, "Commits issued by the runners");
}
