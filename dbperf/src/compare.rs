//! Side-by-side comparison of two stored reports.
//!
//! For every test present in both reports, each tracked metric gets an absolute percentage
//! difference `|v1 - v2| / v2 * 100` (zero when `v2` is zero). A side is only called the winner
//! once that difference reaches the threshold: higher throughput wins, lower latency wins.
use crate::report::StoredReport;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const DEFAULT_THRESHOLD: f64 = 10.0;

const WIDE: usize = 90;

struct TestDefinition {
    key: &'static str,
    title: &'static str,
    metrics: &'static [&'static str],
}

const TESTS: &[TestDefinition] = &[
    TestDefinition {
        key: "single_inserts",
        title: "SINGLE INSERT OPERATIONS",
        metrics: &[
            "tps",
            "avg_latency_ms",
            "median_latency_ms",
            "p95_latency_ms",
            "p99_latency_ms",
        ],
    },
    TestDefinition {
        key: "batch_inserts",
        title: "BATCH INSERT OPERATIONS",
        metrics: &["tps", "avg_batch_latency_ms", "p95_batch_latency_ms"],
    },
    TestDefinition {
        key: "concurrent_writes",
        title: "CONCURRENT WRITE OPERATIONS",
        metrics: &[
            "tps",
            "avg_latency_ms",
            "median_latency_ms",
            "p95_latency_ms",
            "p99_latency_ms",
        ],
    },
    TestDefinition {
        key: "updates",
        title: "UPDATE OPERATIONS",
        metrics: &["tps", "avg_latency_ms", "p95_latency_ms"],
    },
    TestDefinition {
        key: "point_reads",
        title: "POINT READ OPERATIONS",
        metrics: &[
            "qps",
            "avg_latency_ms",
            "median_latency_ms",
            "p95_latency_ms",
            "p99_latency_ms",
        ],
    },
    TestDefinition {
        key: "range_reads",
        title: "RANGE READ OPERATIONS",
        metrics: &["qps", "avg_latency_ms", "p95_latency_ms"],
    },
];

#[derive(Clone, Copy)]
enum Detail {
    Avg,
    P95,
}

/// Headline tests for the closing takeaways, with the latency figure quoted for each.
const TAKEAWAYS: &[(&str, &str, Option<Detail>)] = &[
    ("single_inserts", "Single Insert Performance", Some(Detail::Avg)),
    ("batch_inserts", "Batch Insert Performance", None),
    ("concurrent_writes", "Concurrent Write Performance", Some(Detail::P95)),
    ("point_reads", "Point Read Performance", Some(Detail::Avg)),
    ("range_reads", "Range Read Performance", None),
];

const WRITE_TESTS: [&str; 4] = ["single_inserts", "batch_inserts", "concurrent_writes", "updates"];
const READ_TESTS: [&str; 2] = ["point_reads", "range_reads"];

fn metric_title(metric: &str) -> &str {
    match metric {
        "tps" => "Throughput (TPS)",
        "qps" => "Throughput (QPS)",
        "avg_latency_ms" => "Avg Latency (ms)",
        "median_latency_ms" => "Median Latency (ms)",
        "p95_latency_ms" => "P95 Latency (ms)",
        "p99_latency_ms" => "P99 Latency (ms)",
        "avg_batch_latency_ms" => "Avg Batch Latency (ms)",
        "p95_batch_latency_ms" => "P95 Batch Latency (ms)",
        "total_time_sec" => "Total Time (sec)",
        other => other,
    }
}

fn lower_is_better(metric: &str) -> bool {
    metric.contains("latency") || metric.contains("time")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Neither,
    First,
    Second,
}

impl Winner {
    fn id(self) -> u8 {
        match self {
            Winner::Neither => 0,
            Winner::First => 1,
            Winner::Second => 2,
        }
    }
}

/// `|v1 - v2| / v2 * 100`, or zero when `v2` is zero.
pub fn difference_pct(v1: f64, v2: f64) -> f64 {
    if v2 == 0. {
        0.
    } else {
        ((v1 - v2) / v2 * 100.).abs()
    }
}

/// Percentage difference of `v1` against `v2` and which side wins.
pub fn judge(v1: f64, v2: f64, lower_is_better: bool, threshold: f64) -> (f64, Winner) {
    let diff = difference_pct(v1, v2);
    if v2 == 0. || diff < threshold {
        return (diff, Winner::Neither);
    }
    let first_wins = if lower_is_better { v1 < v2 } else { v1 > v2 };
    let winner = if first_wins {
        Winner::First
    } else {
        Winner::Second
    };
    (diff, winner)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricComparison {
    pub metric: &'static str,
    pub first: f64,
    pub second: f64,
    pub difference_pct: f64,
    pub winner: Winner,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestComparison {
    pub test: &'static str,
    pub title: &'static str,
    pub metrics: Vec<MetricComparison>,
}

impl MetricComparison {
    fn sides(&self) -> [f64; 2] {
        [self.first, self.second]
    }
}

impl TestComparison {
    pub fn metric(&self, metric: &str) -> Option<&MetricComparison> {
        self.metrics.iter().find(|m| m.metric == metric)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub write_tests: Vec<&'static str>,
    pub read_tests: Vec<&'static str>,
    #[serde(rename = "db1_write_tps")]
    pub first_write_tps: f64,
    #[serde(rename = "db2_write_tps")]
    pub second_write_tps: f64,
    #[serde(rename = "db1_read_qps")]
    pub first_read_qps: f64,
    #[serde(rename = "db2_read_qps")]
    pub second_read_qps: f64,
}

impl Summary {
    fn new(first: &StoredReport, second: &StoredReport) -> Self {
        let (write_tests, first_write_tps, second_write_tps) =
            mean_throughput(first, second, &WRITE_TESTS, "tps");
        let (read_tests, first_read_qps, second_read_qps) =
            mean_throughput(first, second, &READ_TESTS, "qps");
        Self {
            write_tests,
            read_tests,
            first_write_tps,
            second_write_tps,
            first_read_qps,
            second_read_qps,
        }
    }
}

/// Tests present in both reports, and each side's mean `metric` over them.
fn mean_throughput(
    first: &StoredReport,
    second: &StoredReport,
    tests: &[&'static str],
    metric: &str,
) -> (Vec<&'static str>, f64, f64) {
    let mut present = vec![];
    let (mut sum1, mut sum2) = (0., 0.);
    for test in tests {
        if let (Some(v1), Some(v2)) = (first.metric(test, metric), second.metric(test, metric)) {
            present.push(*test);
            sum1 += v1;
            sum2 += v2;
        }
    }
    if present.is_empty() {
        (present, 0., 0.)
    } else {
        let n = present.len() as f64;
        (present, sum1 / n, sum2 / n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Side {
    pub label: String,
    pub host: String,
    pub database: String,
    pub timestamp: String,
}

impl Side {
    fn new(report: &StoredReport, label: Option<&str>, fallback: &str) -> Self {
        Self {
            label: label
                .map(str::to_string)
                .or_else(|| report.label.clone())
                .unwrap_or_else(|| fallback.to_string()),
            host: report.host.clone(),
            database: report.database.clone(),
            timestamp: report.timestamp.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub first: Side,
    pub second: Side,
    pub threshold: f64,
    pub tests: Vec<TestComparison>,
    pub summary: Summary,
}

impl Comparison {
    /// `labels` override the labels stored in the reports.
    pub fn new(
        first: &StoredReport,
        second: &StoredReport,
        labels: (Option<&str>, Option<&str>),
        threshold: f64,
    ) -> Self {
        let tests = TESTS
            .iter()
            .filter(|def| {
                first.results.contains_key(def.key) && second.results.contains_key(def.key)
            })
            .map(|def| TestComparison {
                test: def.key,
                title: def.title,
                metrics: def
                    .metrics
                    .iter()
                    .filter_map(|&metric| {
                        let v1 = first.metric(def.key, metric)?;
                        let v2 = second.metric(def.key, metric)?;
                        let (difference_pct, winner) =
                            judge(v1, v2, lower_is_better(metric), threshold);
                        Some(MetricComparison {
                            metric,
                            first: v1,
                            second: v2,
                            difference_pct,
                            winner,
                        })
                    })
                    .collect(),
            })
            .collect();

        Self {
            first: Side::new(first, labels.0, "Database 1"),
            second: Side::new(second, labels.1, "Database 2"),
            threshold,
            tests,
            summary: Summary::new(first, second),
        }
    }

    fn winner_label(&self, winner: Winner) -> &str {
        match winner {
            Winner::Neither => "",
            Winner::First => &self.first.label,
            Winner::Second => &self.second.label,
        }
    }

    /// Who has the higher mean throughput, and by how much relative to the other side.
    fn overall(&self, v1: f64, v2: f64) -> (&str, f64) {
        if v1 > v2 {
            (&self.first.label, difference_pct(v1, v2))
        } else {
            (&self.second.label, difference_pct(v2, v1))
        }
    }

    fn test(&self, test: &str) -> Option<&TestComparison> {
        self.tests.iter().find(|t| t.test == test)
    }

    fn takeaways(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = TAKEAWAYS.iter().filter_map(|&(test, heading, detail)| {
            let test = self.test(test)?;
            let unit = if READ_TESTS.contains(&test.test) {
                "qps"
            } else {
                "tps"
            };
            Some((test, heading, detail, unit, test.metric(unit)?))
        });

        for (n, (test, heading, detail, unit, throughput)) in present.enumerate() {
            let latency = detail.and_then(|d| {
                let metric = match d {
                    Detail::Avg => "avg_latency_ms",
                    Detail::P95 => "p95_latency_ms",
                };
                Some((d, test.metric(metric)?))
            });

            writeln!(f)?;
            writeln!(f, "{}. {heading}:", n + 1)?;
            for (i, side) in [&self.first, &self.second].into_iter().enumerate() {
                let value = throughput.sides()[i];
                write!(f, "   {}: {value:.2} {}", side.label, unit.to_uppercase())?;
                match latency {
                    Some((Detail::Avg, m)) => write!(f, ", {:.2} ms avg", m.sides()[i])?,
                    Some((Detail::P95, m)) => write!(f, ", P95: {:.2} ms", m.sides()[i])?,
                    None => {}
                }
                writeln!(f)?;
            }

            if throughput.winner != Winner::Neither {
                writeln!(
                    f,
                    "   → {} is {:.1}% faster",
                    self.winner_label(throughput.winner),
                    throughput.difference_pct
                )?;
            }
        }
        Ok(())
    }

    pub fn table(&self) -> impl fmt::Display + '_ {
        Table(self)
    }

    pub fn markdown(&self) -> impl fmt::Display + '_ {
        Markdown(self)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let now = OffsetDateTime::now_utc();
        let comparison_date = now
            .format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string());

        let comparisons: serde_json::Map<String, serde_json::Value> = self
            .tests
            .iter()
            .map(|test| {
                let metrics: serde_json::Map<String, serde_json::Value> = test
                    .metrics
                    .iter()
                    .map(|m| {
                        let value = json!({
                            "database1_value": m.first,
                            "database2_value": m.second,
                            "difference_pct": round2(m.difference_pct),
                            "winner": m.winner.id(),
                        });
                        (m.metric.to_string(), value)
                    })
                    .collect();
                let value = json!({ "name": test.title, "metrics": metrics });
                (test.test.to_string(), value)
            })
            .collect();

        json!({
            "metadata": {
                "comparison_date": comparison_date,
                "threshold": self.threshold,
            },
            "database1": self.first,
            "database2": self.second,
            "comparisons": comparisons,
            "summary": self.summary,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.).round() / 100.
}

struct Table<'a>(&'a Comparison);

impl fmt::Display for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.0;
        let rule = "=".repeat(WIDE);
        writeln!(f, "{rule}")?;
        writeln!(f, "MYSQL PERFORMANCE COMPARISON")?;
        writeln!(f, "{rule}")?;
        for (n, side) in [(1, &c.first), (2, &c.second)] {
            writeln!(f)?;
            writeln!(f, "Database {n}: {} ({})", side.label, side.host)?;
            writeln!(f, "  Database: {}", side.database)?;
            writeln!(f, "  Tested: {}", side.timestamp)?;
        }

        for test in &c.tests {
            writeln!(f)?;
            writeln!(f, "{rule}")?;
            writeln!(f, "{}", test.title)?;
            writeln!(f, "{rule}")?;
            writeln!(f)?;
            writeln!(
                f,
                "{:<30} {:<20} {:<20} {:<20}",
                "Metric", c.first.label, c.second.label, "Difference"
            )?;
            writeln!(f, "{}", "-".repeat(WIDE))?;
            for m in &test.metrics {
                writeln!(
                    f,
                    "{:<30} {:<20.2} {:<20.2} {:>7.2}% {}",
                    metric_title(m.metric),
                    m.first,
                    m.second,
                    m.difference_pct,
                    c.winner_label(m.winner)
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "OVERALL SUMMARY")?;
        writeln!(f, "{rule}")?;
        let s = &c.summary;
        if !s.write_tests.is_empty() {
            writeln!(f)?;
            writeln!(f, "Average Write Throughput:")?;
            writeln!(f, "  {}: {:.2} TPS", c.first.label, s.first_write_tps)?;
            writeln!(f, "  {}: {:.2} TPS", c.second.label, s.second_write_tps)?;
            let diff = difference_pct(s.first_write_tps, s.second_write_tps);
            writeln!(f, "  Difference: {diff:.2}%")?;
        }
        if !s.read_tests.is_empty() {
            writeln!(f)?;
            writeln!(f, "Average Read Throughput:")?;
            writeln!(f, "  {}: {:.2} QPS", c.first.label, s.first_read_qps)?;
            writeln!(f, "  {}: {:.2} QPS", c.second.label, s.second_read_qps)?;
            let diff = difference_pct(s.first_read_qps, s.second_read_qps);
            writeln!(f, "  Difference: {diff:.2}%")?;
        }

        writeln!(f)?;
        writeln!(f, "{rule}")?;
        if !s.write_tests.is_empty() {
            let (label, pct) = c.overall(s.first_write_tps, s.second_write_tps);
            writeln!(f, "WINNER: {label} has BETTER WRITE PERFORMANCE by {pct:.2}%")?;
        }
        if !s.read_tests.is_empty() {
            let (label, pct) = c.overall(s.first_read_qps, s.second_read_qps);
            writeln!(f, "WINNER: {label} has BETTER READ PERFORMANCE by {pct:.2}%")?;
        }
        writeln!(f, "{rule}")?;

        writeln!(f)?;
        write!(f, "KEY TAKEAWAYS:")?;
        c.takeaways(f)
    }
}

struct Markdown<'a>(&'a Comparison);

impl fmt::Display for Markdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.0;
        writeln!(f, "# MySQL Performance Comparison")?;
        writeln!(f)?;
        writeln!(f, "## Test Information")?;
        for (n, side) in [(1, &c.first), (2, &c.second)] {
            writeln!(f)?;
            writeln!(f, "**Database {n}:** {} (`{}`)", side.label, side.host)?;
            writeln!(f, "- Database: `{}`", side.database)?;
            writeln!(f, "- Tested: {}", side.timestamp)?;
        }

        for test in &c.tests {
            writeln!(f)?;
            writeln!(f, "## {}", test.title)?;
            writeln!(f)?;
            writeln!(
                f,
                "| Metric | {} | {} | Difference | Winner |",
                c.first.label, c.second.label
            )?;
            writeln!(f, "|--------|----------|----------|----------|----------|")?;
            for m in &test.metrics {
                writeln!(
                    f,
                    "| {} | {:.2} | {:.2} | {:.2}% | {} |",
                    metric_title(m.metric),
                    m.first,
                    m.second,
                    m.difference_pct,
                    c.winner_label(m.winner)
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "## Overall Summary")?;
        let s = &c.summary;
        for (title, unit, tests, v1, v2) in [
            ("Write", "TPS", &s.write_tests, s.first_write_tps, s.second_write_tps),
            ("Read", "QPS", &s.read_tests, s.first_read_qps, s.second_read_qps),
        ] {
            if tests.is_empty() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "### {title} Performance")?;
            writeln!(f)?;
            writeln!(f, "- **{}:** {v1:.2} {unit}", c.first.label)?;
            writeln!(f, "- **{}:** {v2:.2} {unit}", c.second.label)?;
            writeln!(f, "- **Difference:** {:.2}%", difference_pct(v1, v2))?;
        }

        writeln!(f)?;
        writeln!(f, "## Winner")?;
        if !s.write_tests.is_empty() {
            let (label, pct) = c.overall(s.first_write_tps, s.second_write_tps);
            writeln!(f)?;
            writeln!(f, "**{label}** has better write performance by **{pct:.2}%**")?;
        }
        if !s.read_tests.is_empty() {
            let (label, pct) = c.overall(s.first_read_qps, s.second_read_qps);
            writeln!(f)?;
            writeln!(f, "**{label}** has better read performance by **{pct:.2}%**")?;
        }
        Ok(())
    }
}
