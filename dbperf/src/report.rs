//! Persisting run reports.
use dbperf_core::RunReport;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

/// Where reports and comparisons land unless a path with a directory is given.
pub const OUTPUT_DIR: &str = "output";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unable to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a valid report: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `output/dbperf_<label>_<YYYYmmdd_HHMMSS>.json`, with spaces and slashes in the label
/// replaced.
pub fn default_report_path(label: &str, at: OffsetDateTime) -> PathBuf {
    let safe_label: String = label
        .chars()
        .map(|c| if c == ' ' || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let stamp = at
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    Path::new(OUTPUT_DIR).join(format!("dbperf_{safe_label}_{stamp}.json"))
}

/// Bare file names are placed under [`OUTPUT_DIR`]; anything with a directory is kept as is.
pub fn resolve_output(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => path.to_path_buf(),
        _ => Path::new(OUTPUT_DIR).join(path),
    }
}

fn create_parent(path: &Path) -> Result<(), ReportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Writes `report` as pretty JSON, creating the parent directory if needed.
pub fn write_report(report: &RunReport, path: &Path) -> Result<(), ReportError> {
    create_parent(path)?;
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).map_err(|source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    info!("Results saved to {}", path.display());
    Ok(())
}

/// Writes arbitrary text output, e.g. a rendered comparison.
pub fn write_text(text: &str, path: &Path) -> Result<(), ReportError> {
    create_parent(path)?;
    fs::write(path, text).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// A report as read back from disk.
///
/// Results are kept as loose metric maps so reports from older or newer versions still load.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredReport {
    #[serde(default)]
    pub label: Option<String>,
    pub host: String,
    pub database: String,
    pub timestamp: String,
    pub results: BTreeMap<String, BTreeMap<String, f64>>,
}

impl StoredReport {
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let file = File::open(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ReportError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn metric(&self, test: &str, metric: &str) -> Option<f64> {
        self.results.get(test)?.get(metric).copied()
    }
}

/// Short human summary of a finished run.
pub struct Summary<'a>(pub &'a RunReport);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "TEST SUMMARY - {}", report.label)?;
        writeln!(f, "{}", "=".repeat(60))?;
        for result in report.results() {
            let unit = if result.kind.is_read() { "QPS" } else { "TPS" };
            writeln!(f)?;
            writeln!(f, "{}:", result.kind)?;
            writeln!(f, "  {unit}: {:.2}", result.throughput())?;
            writeln!(f, "  Avg Latency: {:.2} ms", result.stats.avg)?;
            writeln!(f, "  P95 Latency: {:.2} ms", result.stats.p95)?;
        }
        for failure in report.failures() {
            writeln!(f)?;
            writeln!(f, "{} FAILED: {}", failure.test, failure.error)?;
        }
        Ok(())
    }
}
