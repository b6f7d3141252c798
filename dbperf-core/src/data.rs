use crate::LatencyStats;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Which test produced a result, together with the parameters it ran with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    SingleInserts {
        commit_every: u64,
    },
    BatchInserts {
        batches: u64,
        batch_size: u64,
    },
    ConcurrentWrites {
        threads: usize,
        writes_per_thread: u64,
        commit_every: u64,
    },
    Updates,
    PointReads,
    RangeReads {
        range_size: u64,
    },
}

impl TestKind {
    /// Key of this test in the report. Downstream tooling matches on these.
    pub fn name(&self) -> &'static str {
        match self {
            TestKind::SingleInserts { .. } => "single_inserts",
            TestKind::BatchInserts { .. } => "batch_inserts",
            TestKind::ConcurrentWrites { .. } => "concurrent_writes",
            TestKind::Updates => "updates",
            TestKind::PointReads => "point_reads",
            TestKind::RangeReads { .. } => "range_reads",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, TestKind::PointReads | TestKind::RangeReads { .. })
    }

    fn throughput_field(&self) -> &'static str {
        if self.is_read() {
            "qps"
        } else {
            "tps"
        }
    }

    fn count_field(&self) -> &'static str {
        match self {
            TestKind::RangeReads { .. } => "queries",
            _ => "records",
        }
    }

    fn latency_field(&self, stat: &str) -> String {
        match self {
            TestKind::BatchInserts { .. } => format!("{stat}_batch_latency_ms"),
            _ => format!("{stat}_latency_ms"),
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one successful test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub kind: TestKind,
    /// Wall clock for the whole test, including commits outside the timed spans.
    pub elapsed: Duration,
    /// Records written or queries issued.
    pub count: u64,
    pub stats: LatencyStats,
}

impl TestResult {
    pub fn new(kind: TestKind, elapsed: Duration, count: u64, stats: LatencyStats) -> Self {
        Self {
            kind,
            elapsed,
            count,
            stats,
        }
    }

    /// Records (or queries) per second of wall clock.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0. {
            self.count as f64 / secs
        } else {
            0.
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} in {}, {}={:.2}, {}",
            self.kind,
            self.count,
            humantime::format_duration(self.elapsed),
            self.kind.throughput_field().to_uppercase(),
            self.throughput(),
            self.stats,
        )
    }
}

impl Serialize for TestResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("total_time_sec", &round2(self.elapsed.as_secs_f64()))?;
        map.serialize_entry(self.kind.count_field(), &self.count)?;

        match self.kind {
            TestKind::SingleInserts { commit_every } => {
                map.serialize_entry("commit_every", &commit_every)?;
            }
            TestKind::BatchInserts {
                batches,
                batch_size,
            } => {
                map.serialize_entry("batches", &batches)?;
                map.serialize_entry("batch_size", &batch_size)?;
            }
            TestKind::ConcurrentWrites {
                threads,
                writes_per_thread,
                commit_every,
            } => {
                map.serialize_entry("threads", &threads)?;
                map.serialize_entry("writes_per_thread", &writes_per_thread)?;
                map.serialize_entry("commit_every", &commit_every)?;
            }
            TestKind::RangeReads { range_size } => {
                map.serialize_entry("range_size", &range_size)?;
            }
            TestKind::Updates | TestKind::PointReads => {}
        }

        map.serialize_entry(self.kind.throughput_field(), &round2(self.throughput()))?;
        for (stat, value) in self.stats.fields() {
            map.serialize_entry(&self.kind.latency_field(stat), &round2(value))?;
        }
        map.end()
    }
}

/// A test that did not complete. It carries no statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestFailure {
    pub test: String,
    pub error: String,
}

/// Everything one run produced. Results keep execution order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub label: String,
    pub host: String,
    pub database: String,
    pub timestamp: String,
    #[serde(serialize_with = "serialize_results")]
    results: Vec<TestResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<TestFailure>,
}

impl RunReport {
    pub fn new(label: &str, host: &str, database: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        let timestamp = now
            .format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string());
        Self::with_timestamp(label, host, database, &timestamp)
    }

    pub fn with_timestamp(label: &str, host: &str, database: &str, timestamp: &str) -> Self {
        Self {
            label: label.to_string(),
            host: host.to_string(),
            database: database.to_string(),
            timestamp: timestamp.to_string(),
            results: vec![],
            failures: vec![],
        }
    }

    pub fn push_result(&mut self, result: TestResult) {
        self.results.push(result);
    }

    pub fn push_failure(&mut self, test: &str, error: &dyn fmt::Display) {
        self.failures.push(TestFailure {
            test: test.to_string(),
            error: error.to_string(),
        });
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.kind.name() == name)
    }

    pub fn failures(&self) -> &[TestFailure] {
        &self.failures
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn serialize_results<S>(results: &[TestResult], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(results.iter().map(|r| (r.kind.name(), r)))
}

fn round2(value: f64) -> f64 {
    (value * 100.).round() / 100.
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn stats() -> LatencyStats {
        LatencyStats {
            avg: 1.234,
            median: 1.0,
            p95: 2.5,
            p99: 3.456,
            min: 0.5,
            max: 4.0,
        }
    }

    fn keys(value: &Value) -> Vec<&str> {
        value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn single_insert_fields() {
        let result = TestResult::new(
            TestKind::SingleInserts { commit_every: 5 },
            Duration::from_secs(2),
            50,
            stats(),
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["total_time_sec"], 2.0);
        assert_eq!(json["records"], 50);
        assert_eq!(json["commit_every"], 5);
        assert_eq!(json["tps"], 25.0);
        assert_eq!(json["avg_latency_ms"], 1.23);
        assert_eq!(json["median_latency_ms"], 1.0);
        assert_eq!(json["p95_latency_ms"], 2.5);
        assert_eq!(json["p99_latency_ms"], 3.46);
        assert_eq!(json["min_latency_ms"], 0.5);
        assert_eq!(json["max_latency_ms"], 4.0);
        assert_eq!(keys(&json).len(), 10);
    }

    #[test]
    fn batch_inserts_use_batch_latency_names() {
        let result = TestResult::new(
            TestKind::BatchInserts {
                batches: 10,
                batch_size: 100,
            },
            Duration::from_secs(4),
            1_000,
            stats(),
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["batches"], 10);
        assert_eq!(json["batch_size"], 100);
        assert_eq!(json["tps"], 250.0);
        assert_eq!(json["avg_batch_latency_ms"], 1.23);
        assert_eq!(json["p95_batch_latency_ms"], 2.5);
        assert!(json.get("avg_latency_ms").is_none());
    }

    #[test]
    fn reads_report_qps() {
        let range = TestResult::new(
            TestKind::RangeReads { range_size: 100 },
            Duration::from_secs(1),
            20,
            stats(),
        );
        let json = serde_json::to_value(&range).unwrap();
        assert_eq!(json["queries"], 20);
        assert_eq!(json["range_size"], 100);
        assert_eq!(json["qps"], 20.0);
        assert!(json.get("tps").is_none());
        assert!(json.get("records").is_none());

        let point = TestResult::new(TestKind::PointReads, Duration::from_secs(1), 20, stats());
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["records"], 20);
        assert_eq!(json["qps"], 20.0);
    }

    #[test]
    fn report_layout() {
        let mut report =
            RunReport::with_timestamp("Local", "db.local", "perftest", "2024-01-01T00:00:00Z");
        report.push_result(TestResult::new(
            TestKind::Updates,
            Duration::from_secs(1),
            10,
            stats(),
        ));
        report.push_result(TestResult::new(
            TestKind::PointReads,
            Duration::from_secs(1),
            10,
            stats(),
        ));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["label"], "Local");
        assert_eq!(json["host"], "db.local");
        assert_eq!(json["database"], "perftest");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(json["results"]["updates"]["tps"], 10.0);
        assert!(json.get("failures").is_none());

        // Execution order survives serialization.
        let text = serde_json::to_string(&report).unwrap();
        assert!(text.find("\"updates\"").unwrap() < text.find("\"point_reads\"").unwrap());
    }

    #[test]
    fn failures_are_listed() {
        let mut report = RunReport::with_timestamp("Local", "h", "d", "t");
        report.push_failure("concurrent_writes", &"worker 3 failed");
        assert!(!report.is_complete());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failures"][0]["test"], "concurrent_writes");
        assert_eq!(json["failures"][0]["error"], "worker 3 failed");
        assert_eq!(json["results"], serde_json::json!({}));
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let report = RunReport::new("Local", "h", "d");
        assert!(OffsetDateTime::parse(&report.timestamp, &Rfc3339).is_ok());
    }

    #[test]
    fn zero_elapsed_has_zero_throughput() {
        let result = TestResult::new(TestKind::Updates, Duration::ZERO, 10, stats());
        assert_eq!(result.throughput(), 0.);
    }
}
