//! Offline analysis of recorded time series.
//!
//! Every run is assumed to submit all of its jobs at `t0`, the start of the
//! first quantum. Working time is what the scheduler granted; the rest of a
//! job's response time was spent waiting in the queue.

use crate::timeseries::FIXED_COLUMNS;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("failed to read time series")]
    Io(#[from] std::io::Error),

    #[error("malformed time-series CSV")]
    Csv(#[from] csv::Error),

    #[error("{source_name}: missing column {column:?}")]
    MissingColumn {
        source_name: String,
        column: &'static str,
    },

    #[error("{source_name}: line {line}: invalid {column} value {value:?}")]
    InvalidValue {
        source_name: String,
        line: u64,
        column: &'static str,
        value: String,
    },

    #[error("{0}: no quanta recorded")]
    Empty(String),

    #[error("no CSV files found in {0}")]
    NoCsvFiles(PathBuf),

    #[error("invalid baseline {0:?}, expected NAME=SECONDS")]
    InvalidBaseline(String),
}

/// Jain's fairness index, `(Σx)² / (n·Σx²)`.
///
/// 1.0 means perfectly equal, `1/n` means one value holds everything.
/// Empty and all-zero inputs yield 0.0.
#[must_use]
pub fn jain_fairness(values: &[f64]) -> f64 {
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    if values.is_empty() || sum_sq == 0.0 {
        return 0.0;
    }
    (sum * sum) / (values.len() as f64 * sum_sq)
}

/// Parse a `NAME=SECONDS` baseline (standalone run time of a job).
pub fn parse_baseline(arg: &str) -> Result<(String, f64), AnalysisError> {
    let invalid = || AnalysisError::InvalidBaseline(arg.to_string());
    let (name, secs) = arg.split_once('=').ok_or_else(invalid)?;
    let secs: f64 = secs.trim().parse().map_err(|_| invalid())?;
    if name.trim().is_empty() || secs.is_nan() || secs <= 0.0 {
        return Err(invalid());
    }
    Ok((name.trim().to_string(), secs))
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobTimes {
    pub name: String,
    pub working_time: f64,
    pub waiting_time: f64,
    pub response_time: f64,
    /// Timestamp of the job's last quantum
    pub finish: f64,
    /// `response_time / baseline`, when a baseline was given
    pub slowdown: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunAnalysis {
    pub source_name: String,
    /// In order of first appearance
    pub jobs: Vec<JobTimes>,
    pub makespan: f64,
    pub throughput: f64,
    /// Jain index over time shares (`working_time / makespan`)
    pub fairness: f64,
    /// Jain index over slowdowns of the jobs that have a baseline
    pub slowdown_fairness: Option<f64>,
}

impl RunAnalysis {
    pub fn job(&self, name: &str) -> Option<&JobTimes> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

impl fmt::Display for RunAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== Results for {} ====", self.source_name)?;
        writeln!(
            f,
            "{:<24} {:>12} {:>12} {:>12} {:>10}",
            "job", "working(s)", "waiting(s)", "response(s)", "slowdown"
        )?;
        for job in &self.jobs {
            let slowdown = job
                .slowdown
                .map(|s| format!("{s:.2}"))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "{:<24} {:>12.2} {:>12.2} {:>12.2} {:>10}",
                job.name, job.working_time, job.waiting_time, job.response_time, slowdown
            )?;
        }
        writeln!(f, "Makespan: {:.2} seconds", self.makespan)?;
        writeln!(f, "Throughput (jobs/second): {:.6}", self.throughput)?;
        writeln!(f, "Fairness index (Jain over shares): {:.4}", self.fairness)?;
        if let Some(fairness) = self.slowdown_fairness {
            writeln!(f, "Fairness index (Jain over slowdowns): {fairness:.4}")?;
        }
        Ok(())
    }
}

struct Row {
    timestamp: f64,
    job_name: String,
    working_time: f64,
}

fn column_index(
    headers: &csv::StringRecord,
    column: &'static str,
    source_name: &str,
) -> Result<usize, AnalysisError> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| AnalysisError::MissingColumn {
            source_name: source_name.to_string(),
            column,
        })
}

fn read_rows<R: Read>(source_name: &str, reader: R) -> Result<Vec<Row>, AnalysisError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let [ts_col, name_col, work_col, _] = FIXED_COLUMNS;
    let ts_idx = column_index(&headers, ts_col, source_name)?;
    let name_idx = column_index(&headers, name_col, source_name)?;
    let work_idx = column_index(&headers, work_col, source_name)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let number = |idx: usize, column: &'static str| -> Result<f64, AnalysisError> {
            let value = record.get(idx).unwrap_or_default();
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| AnalysisError::InvalidValue {
                    source_name: source_name.to_string(),
                    line,
                    column,
                    value: value.to_string(),
                })
        };
        rows.push(Row {
            timestamp: number(ts_idx, ts_col)?,
            job_name: record.get(name_idx).unwrap_or_default().to_string(),
            working_time: number(work_idx, work_col)?,
        });
    }
    Ok(rows)
}

/// Analyse one time series read from `reader`.
pub fn analyze_reader<R: Read>(
    source_name: &str,
    reader: R,
    baselines: &HashMap<String, f64>,
) -> Result<RunAnalysis, AnalysisError> {
    let rows = read_rows(source_name, reader)?;
    let (first, last) = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(AnalysisError::Empty(source_name.to_string())),
    };
    let t0 = first.timestamp - first.working_time;
    let makespan = last.timestamp - t0;
    debug!("{}: {} quanta, t0 {}", source_name, rows.len(), t0);

    let mut order: Vec<&str> = Vec::new();
    let mut per_job: HashMap<&str, (f64, f64)> = HashMap::new();
    for row in &rows {
        let entry = per_job.entry(row.job_name.as_str()).or_insert_with(|| {
            order.push(row.job_name.as_str());
            (0.0, t0)
        });
        entry.0 += row.working_time;
        entry.1 = row.timestamp;
    }

    let jobs: Vec<JobTimes> = order
        .iter()
        .map(|name| {
            let (working_time, finish) = per_job[name];
            let response_time = finish - t0;
            JobTimes {
                name: name.to_string(),
                working_time,
                waiting_time: (response_time - working_time).max(0.0),
                response_time,
                finish,
                slowdown: baselines.get(*name).map(|b| response_time / b),
            }
        })
        .collect();

    let throughput = if makespan > 0.0 {
        jobs.len() as f64 / makespan
    } else {
        0.0
    };
    let shares: Vec<f64> = jobs
        .iter()
        .map(|j| {
            if makespan > 0.0 {
                j.working_time / makespan
            } else {
                0.0
            }
        })
        .collect();
    let slowdowns: Vec<f64> = jobs.iter().filter_map(|j| j.slowdown).collect();

    Ok(RunAnalysis {
        source_name: source_name.to_string(),
        makespan,
        throughput,
        fairness: jain_fairness(&shares),
        slowdown_fairness: (!slowdowns.is_empty()).then(|| jain_fairness(&slowdowns)),
        jobs,
    })
}

pub fn analyze_file(
    path: &Path,
    baselines: &HashMap<String, f64>,
) -> Result<RunAnalysis, AnalysisError> {
    let file = File::open(path)?;
    analyze_reader(&path.display().to_string(), file, baselines)
}

/// Analyse every `.csv` file in `dir`, in file-name order.
pub fn analyze_directory(
    dir: &Path,
    baselines: &HashMap<String, f64>,
) -> Result<Vec<RunAnalysis>, AnalysisError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(AnalysisError::NoCsvFiles(dir.to_path_buf()));
    }
    files.sort();
    info!("found {} CSV files in {}", files.len(), dir.display());
    files
        .iter()
        .map(|path| analyze_file(path, baselines))
        .collect()
}

/// A single file, or every CSV in a directory.
pub fn analyze_path(
    path: &Path,
    baselines: &HashMap<String, f64>,
) -> Result<Vec<RunAnalysis>, AnalysisError> {
    if path.is_dir() {
        analyze_directory(path, baselines)
    } else {
        Ok(vec![analyze_file(path, baselines)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = "\
timestamp,job_name,working_time,total_running_time,mem_used,mem_total
1120,a,120,120,100,1000
1240,b,120,120,,
1360,a,120,240,300,1000
1420,b,60,180,200,1000
";

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_jain_fairness() {
        assert_eq!(jain_fairness(&[]), 0.0);
        assert_eq!(jain_fairness(&[0.0, 0.0]), 0.0);
        assert!(close(jain_fairness(&[3.0, 3.0, 3.0]), 1.0));
        assert!(close(jain_fairness(&[1.0, 0.0]), 0.5));
        assert!(close(jain_fairness(&[5.0, 0.0, 0.0, 0.0]), 0.25));
    }

    #[test]
    fn test_analyze_run() {
        let analysis = analyze_reader("run", RUN.as_bytes(), &HashMap::new()).unwrap();
        assert_eq!(
            analysis.jobs.iter().map(|j| j.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(close(analysis.makespan, 420.0));
        assert!(close(analysis.throughput, 2.0 / 420.0));

        let a = analysis.job("a").unwrap();
        assert!(close(a.working_time, 240.0));
        assert!(close(a.response_time, 360.0));
        assert!(close(a.waiting_time, 120.0));
        assert_eq!(a.slowdown, None);

        let b = analysis.job("b").unwrap();
        assert!(close(b.working_time, 180.0));
        assert!(close(b.response_time, 420.0));
        assert!(close(b.waiting_time, 240.0));

        assert!(close(analysis.fairness, 0.98));
        assert_eq!(analysis.slowdown_fairness, None);
    }

    #[test]
    fn test_slowdown_with_baselines() {
        let baselines = HashMap::from([("a".to_string(), 120.0), ("b".to_string(), 140.0)]);
        let analysis = analyze_reader("run", RUN.as_bytes(), &baselines).unwrap();
        assert!(close(analysis.job("a").unwrap().slowdown.unwrap(), 3.0));
        assert!(close(analysis.job("b").unwrap().slowdown.unwrap(), 3.0));
        assert!(close(analysis.slowdown_fairness.unwrap(), 1.0));
    }

    #[test]
    fn test_single_quantum_run() {
        let csv = "timestamp,job_name,working_time,total_running_time\n500,solo,100,100\n";
        let analysis = analyze_reader("solo", csv.as_bytes(), &HashMap::new()).unwrap();
        let solo = analysis.job("solo").unwrap();
        assert!(close(solo.waiting_time, 0.0));
        assert!(close(analysis.makespan, 100.0));
        assert!(close(analysis.fairness, 1.0));
    }

    #[test]
    fn test_empty_and_malformed_input() {
        let header_only = "timestamp,job_name,working_time,total_running_time\n";
        assert!(matches!(
            analyze_reader("empty", header_only.as_bytes(), &HashMap::new()),
            Err(AnalysisError::Empty(_))
        ));

        let missing = "timestamp,job_name\n1,a\n";
        assert!(matches!(
            analyze_reader("missing", missing.as_bytes(), &HashMap::new()),
            Err(AnalysisError::MissingColumn {
                column: "working_time",
                ..
            })
        ));

        let bad = "timestamp,job_name,working_time,total_running_time\nsoon,a,1,1\n";
        assert!(matches!(
            analyze_reader("bad", bad.as_bytes(), &HashMap::new()),
            Err(AnalysisError::InvalidValue {
                column: "timestamp",
                ..
            })
        ));
    }

    #[test]
    fn test_parse_baseline() {
        assert_eq!(parse_baseline("a=120").unwrap(), ("a".to_string(), 120.0));
        assert_eq!(parse_baseline("big = 2.5").unwrap(), ("big".to_string(), 2.5));
        assert!(parse_baseline("a").is_err());
        assert!(parse_baseline("=5").is_err());
        assert!(parse_baseline("a=0").is_err());
        assert!(parse_baseline("a=fast").is_err());
    }

    #[test]
    fn test_analyze_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_run.csv"), RUN).unwrap();
        std::fs::write(dir.path().join("a_run.CSV"), RUN).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let runs = analyze_path(dir.path(), &HashMap::new()).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].source_name.ends_with("a_run.CSV"));
        assert!(runs[1].source_name.ends_with("b_run.csv"));
    }

    #[test]
    fn test_directory_without_csv() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            analyze_directory(dir.path(), &HashMap::new()),
            Err(AnalysisError::NoCsvFiles(_))
        ));
    }

    #[test]
    fn test_report_mentions_every_job() {
        let analysis = analyze_reader("run", RUN.as_bytes(), &HashMap::new()).unwrap();
        let report = analysis.to_string();
        assert!(report.contains("Results for run"));
        assert!(report.contains("Makespan: 420.00"));
        assert!(report.lines().any(|l| l.starts_with("a ")));
        assert!(report.lines().any(|l| l.starts_with("b ")));
    }
}
