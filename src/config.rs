//! # Measurement configuration
//!
//! All measurement constants live in one immutable [`MeasureConfig`] handed to each component at
//! construction. The defaults match a typical desktop part (64 B lines, 6 MiB shared L3), find the
//! real values on a given machine with `getconf -a | grep CACHE`.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Working-set sizes (in cache lines) swept by the latency profiler
pub const DEFAULT_LATENCY_SIZES: [usize; 8] = [
    1, 10, 100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Cache line size in bytes, used as the access stride
    pub line_size: usize,
    /// Last-level cache size in bytes, the sweep tracer's buffer size
    pub llc_size: usize,
    /// Total sweep trace duration in milliseconds
    pub trace_duration_ms: u64,
    /// Length of one trace slice in milliseconds
    pub slice_period_ms: u64,
    /// Working-set sizes (lines) for latency profiling, each listed once; results are keyed and
    /// ordered by size
    pub latency_sizes: Vec<usize>,
    /// Timed passes per working-set size
    pub trials: usize,
    /// Optional CPU core to pin the measurement thread to
    pub cpu_core: Option<usize>,
    /// Base URL of the trace aggregation service
    pub server_url: String,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        MeasureConfig {
            line_size: 64,
            llc_size: 6_291_456,
            trace_duration_ms: 10_000,
            slice_period_ms: 10,
            latency_sizes: DEFAULT_LATENCY_SIZES.to_vec(),
            trials: 10,
            cpu_core: None,
            server_url: "http://localhost:5000".to_string(),
        }
    }
}

impl MeasureConfig {
    /// Load a JSON config file; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let config: MeasureConfig = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every measurement relies on
    pub fn validate(&self) -> Result<()> {
        if self.line_size == 0 {
            return Err(Error::Config("line_size must be non-zero".into()));
        }
        if self.llc_size < self.line_size {
            return Err(Error::Config(format!(
                "llc_size ({}) must hold at least one {} byte line",
                self.llc_size, self.line_size
            )));
        }
        if self.slice_period_ms == 0 {
            return Err(Error::Config("slice_period_ms must be non-zero".into()));
        }
        if self.trace_duration_ms < self.slice_period_ms {
            return Err(Error::Config(format!(
                "trace_duration_ms ({}) shorter than one slice ({} ms)",
                self.trace_duration_ms, self.slice_period_ms
            )));
        }
        if self.trials == 0 {
            return Err(Error::Config("trials must be non-zero".into()));
        }
        if self.latency_sizes.is_empty() {
            return Err(Error::Config("latency_sizes is empty".into()));
        }
        if self.latency_sizes.contains(&0) {
            return Err(Error::Config("latency_sizes must all be >= 1 line".into()));
        }
        let mut sizes = self.latency_sizes.clone();
        sizes.sort_unstable();
        if let Some(dup) = sizes.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::Config(format!(
                "latency_sizes lists {} lines more than once",
                dup[0]
            )));
        }
        Ok(())
    }

    /// Number of slices in one sweep trace
    pub fn slice_count(&self) -> usize {
        (self.trace_duration_ms / self.slice_period_ms) as usize
    }

    /// Number of lines in the sweep tracer's working set
    pub fn sweep_lines(&self) -> usize {
        self.llc_size / self.line_size
    }

    pub fn slice_period(&self) -> Duration {
        Duration::from_millis(self.slice_period_ms)
    }

    pub fn trace_duration(&self) -> Duration {
        Duration::from_millis(self.trace_duration_ms)
    }
}
