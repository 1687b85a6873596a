//! Per-quantum time series.
//!
//! One row per completed quantum, in chronological order. The column set is
//! fixed by the telemetry capability when the run starts; a quantum whose
//! snapshot is empty still writes every column, with blank device cells.

use crate::telemetry::{DeviceCapability, DeviceSnapshot};
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const TIMESERIES_FILE: &str = "timeseries.csv";

pub const FIXED_COLUMNS: [&str; 4] = [
    "timestamp",
    "job_name",
    "working_time",
    "total_running_time",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    /// Wall-clock end of the quantum, seconds since the epoch
    pub timestamp: i64,
    pub job_name: String,
    pub quantum: Duration,
    /// Includes this quantum
    pub accumulated_run_time: Duration,
    pub snapshot: DeviceSnapshot,
}

/// Column layout of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    capability: DeviceCapability,
    columns: Vec<String>,
}

impl Schema {
    #[must_use]
    pub fn for_capability(capability: DeviceCapability) -> Self {
        let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        match capability {
            DeviceCapability::None => {}
            DeviceCapability::UnifiedMemoryHost => {
                columns.push("mem_used".to_string());
                columns.push("mem_total".to_string());
            }
            DeviceCapability::DiscreteAccelerator { count } => {
                for i in 0..count {
                    columns.push(format!("gpu{i}_mem_used"));
                    columns.push(format!("gpu{i}_mem_total"));
                    columns.push(format!("gpu{i}_util_gpu"));
                    columns.push(format!("gpu{i}_util_mem"));
                }
            }
        }
        Self {
            capability,
            columns,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn capability(&self) -> DeviceCapability {
        self.capability
    }

    /// Render `record` with exactly one cell per column.
    #[must_use]
    pub fn row(&self, record: &TimeSeriesRecord) -> Vec<String> {
        let mut row = Vec::with_capacity(self.columns.len());
        row.push(record.timestamp.to_string());
        row.push(record.job_name.clone());
        row.push(format_secs(record.quantum));
        row.push(format_secs(record.accumulated_run_time));

        match (self.capability, &record.snapshot) {
            (DeviceCapability::None, _) => {}
            (DeviceCapability::UnifiedMemoryHost, DeviceSnapshot::Host(host)) => {
                row.push(host.used.to_string());
                row.push(host.total.to_string());
            }
            (DeviceCapability::DiscreteAccelerator { count }, DeviceSnapshot::Devices(devices)) => {
                for i in 0..count {
                    match devices.get(i) {
                        Some(d) => {
                            row.push(d.mem_used.to_string());
                            row.push(d.mem_total.to_string());
                            row.push(d.util_compute.to_string());
                            row.push(d.util_mem.to_string());
                        }
                        None => row.extend(std::iter::repeat(String::new()).take(4)),
                    }
                }
            }
            // Capture failed or returned another shape: keep the schema.
            _ => row.resize(self.columns.len(), String::new()),
        }
        row
    }
}

/// Whole seconds print as integers, fractions as decimals.
fn format_secs(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        d.as_secs().to_string()
    } else {
        d.as_secs_f64().to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to encode time-series row")]
    Csv(#[from] csv::Error),

    #[error("failed to write time-series file")]
    Io(#[from] std::io::Error),
}

/// Append-only record writer. A successful `append` means the record is
/// durable as far as the writer can tell (flushed).
pub trait RecordSink: Send {
    fn append(&mut self, record: &TimeSeriesRecord) -> Result<(), SinkError>;
}

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    schema: Schema,
}

impl CsvSink<File> {
    /// Create (truncate) `path` and write the header row.
    pub fn create(path: impl AsRef<Path>, schema: Schema) -> Result<Self, SinkError> {
        let file = File::create(path.as_ref())?;
        Self::new(file, schema)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W, schema: Schema) -> Result<Self, SinkError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(schema.columns())?;
        writer.flush()?;
        Ok(Self { writer, schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

impl<W: Write + Send> RecordSink for CsvSink<W> {
    fn append(&mut self, record: &TimeSeriesRecord) -> Result<(), SinkError> {
        self.writer.write_record(self.schema.row(record))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory sink. Clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TimeSeriesRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TimeSeriesRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &TimeSeriesRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
