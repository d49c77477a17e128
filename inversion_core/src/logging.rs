//! Metrics sinks.
//!
//! Training and inference report named scalars (and rendered grid paths)
//! through the [`MetricsSink`] trait. Diagnostic text goes through `tracing`
//! instead.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value};

/// One named value recorded at a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Metric {
    Scalar { name: String, value: f64 },
    Image { name: String, path: PathBuf },
}

impl Metric {
    pub fn scalar(name: impl Into<String>, value: impl Into<f64>) -> Self {
        Metric::Scalar {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn image(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Metric::Image {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Metric::Scalar { name, .. } | Metric::Image { name, .. } => name,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Metric::Scalar { value, .. } => Value::from(*value),
            Metric::Image { path, .. } => Value::from(path.display().to_string()),
        }
    }
}

/// Records named metrics for a step.
pub trait MetricsSink {
    fn record(&mut self, step: usize, metrics: &[Metric]) -> io::Result<()>;
}

impl<S: MetricsSink + ?Sized> MetricsSink for &mut S {
    fn record(&mut self, step: usize, metrics: &[Metric]) -> io::Result<()> {
        (**self).record(step, metrics)
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for Box<S> {
    fn record(&mut self, step: usize, metrics: &[Metric]) -> io::Result<()> {
        (**self).record(step, metrics)
    }
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Serialize)]
struct MetricsLogEntry {
    step: usize,
    timestamp_ms: u128,
    metrics: Map<String, Value>,
}

/// Appends one JSON object per record to a file.
#[derive(Debug, Clone)]
pub struct JsonlMetricsSink {
    path: PathBuf,
}

impl JsonlMetricsSink {
    /// Nothing touches the filesystem until the first record; the parent
    /// directory is created then. Existing content is kept.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn record(&mut self, step: usize, metrics: &[Metric]) -> io::Result<()> {
        let entry = MetricsLogEntry {
            step,
            timestamp_ms: timestamp_ms(),
            metrics: metrics
                .iter()
                .map(|metric| (metric.name().to_string(), metric.to_json()))
                .collect(),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        append_json_line(&self.path, &entry)
    }
}

/// Keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Vec<(usize, Vec<Metric>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[(usize, Vec<Metric>)] {
        &self.records
    }

    /// Every recorded value of scalar `name`, in record order.
    pub fn scalars(&self, name: &str) -> Vec<f64> {
        self.records
            .iter()
            .flat_map(|(_, metrics)| metrics.iter())
            .filter_map(|metric| match metric {
                Metric::Scalar { name: n, value } if n == name => Some(*value),
                _ => None,
            })
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn record(&mut self, step: usize, metrics: &[Metric]) -> io::Result<()> {
        self.records.push((step, metrics.to_vec()));
        Ok(())
    }
}
