//! Metric sinks: where the training loop sends scalar series and evaluation reports.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Consumer of training telemetry.
///
/// `scalar` receives named time series keyed by consumed samples; `report`
/// receives the per-evaluation mapping (`num_sat_greedy`, `num_sat_sample_<k>`,
/// `episode`, `samples`); `on_episode` fires after every episode.
pub trait MetricsSink {
    fn scalar(&mut self, name: &str, value: f64, step: usize);

    fn report(&mut self, _values: &BTreeMap<String, f64>) {}

    fn on_episode(&mut self, _episode: usize, _total: usize) {}

    fn flush(&mut self) {}
}

/// Emits metrics as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn scalar(&mut self, name: &str, value: f64, step: usize) {
        tracing::debug!(metric = name, value, step, "scalar");
    }

    fn report(&mut self, values: &BTreeMap<String, f64>) {
        tracing::info!(?values, "evaluation report");
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event<'a> {
    Scalar {
        name: &'a str,
        value: f64,
        step: usize,
    },
    Report {
        values: &'a BTreeMap<String, f64>,
    },
}

/// Appends one JSON object per metric to a file.
pub struct JsonlSink {
    writer: BufWriter<File>,
    failed: bool,
}

impl JsonlSink {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            failed: false,
        })
    }

    fn write(&mut self, event: &Event<'_>) {
        if self.failed {
            return;
        }
        let result = serde_json::to_writer(&mut self.writer, event)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        if let Err(e) = result {
            // Warn once, then stop writing.
            tracing::warn!(error = %e, "metrics file write failed, disabling JSONL sink");
            self.failed = true;
        }
    }
}

impl MetricsSink for JsonlSink {
    fn scalar(&mut self, name: &str, value: f64, step: usize) {
        self.write(&Event::Scalar { name, value, step });
    }

    fn report(&mut self, values: &BTreeMap<String, f64>) {
        self.write(&Event::Report { values });
        self.flush();
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(error = %e, "metrics file flush failed");
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Forwards every call to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl MetricsSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl MetricsSink for FanoutSink {
    fn scalar(&mut self, name: &str, value: f64, step: usize) {
        for sink in &mut self.sinks {
            sink.scalar(name, value, step);
        }
    }

    fn report(&mut self, values: &BTreeMap<String, f64>) {
        for sink in &mut self.sinks {
            sink.report(values);
        }
    }

    fn on_episode(&mut self, episode: usize, total: usize) {
        for sink in &mut self.sinks {
            sink.on_episode(episode, total);
        }
    }

    fn flush(&mut self) {
        for sink in &mut self.sinks {
            sink.flush();
        }
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub scalars: Vec<(String, f64, usize)>,
    pub reports: Vec<BTreeMap<String, f64>>,
    pub episodes: usize,
}

impl RecordingSink {
    /// All values recorded under `name`, in emission order.
    pub fn series(&self, name: &str) -> Vec<f64> {
        self.scalars
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|&(_, v, _)| v)
            .collect()
    }

    /// Steps at which `name` was recorded.
    pub fn steps(&self, name: &str) -> Vec<usize> {
        self.scalars
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|&(_, _, s)| s)
            .collect()
    }
}

impl MetricsSink for RecordingSink {
    fn scalar(&mut self, name: &str, value: f64, step: usize) {
        self.scalars.push((name.to_string(), value, step));
    }

    fn report(&mut self, values: &BTreeMap<String, f64>) {
        self.reports.push(values.clone());
    }

    fn on_episode(&mut self, episode: usize, _total: usize) {
        self.episodes = episode;
    }
}
