//! User-level cache timing: median access latency per working-set size, and sweep-count traces of
//! an LLC-sized buffer under contention. Measurements run on a dedicated worker thread, and traces
//! are handed to a remote aggregation service for heatmap rendering.
pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod ingest;
pub mod latency;
pub mod protocol;
pub mod session;
pub mod stats;
pub mod sweep;
pub mod working_set;

pub use config::MeasureConfig;
pub use error::{Error, Result};
pub use host::{HostState, MeasurementHost, RunHandle};
pub use ingest::{HeatmapRecord, TraceIngestClient};
pub use latency::{LatencyProfiler, LatencyTable};
pub use protocol::{Command, WorkerResult};
pub use session::{Session, Status};
pub use sweep::{SweepTrace, SweepTracer};

/// Convert number of bytes to formatted string
pub fn format_size(bytes: f32) -> String {
    const GB: f32 = 1024.0 * 1024.0 * 1024.0;
    const MB: f32 = 1024.0 * 1024.0;
    const KB: f32 = 1024.0;

    if bytes >= GB {
        format!("{:.2} GiB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MiB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KiB", bytes / KB)
    } else {
        format!("{:.2} B", bytes)
    }
}

/// Convert number of bytes to formatted string for fixed-width integer string
pub fn format_size_fixed_int(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;

    if bytes >= GB {
        format!("{:>4} GiB", bytes / GB)
    } else if bytes >= MB {
        format!("{:>4} MiB", bytes / MB)
    } else if bytes >= KB {
        format!("{:>4} KiB", bytes / KB)
    } else {
        format!("{:>4} B", bytes)
    }
}
