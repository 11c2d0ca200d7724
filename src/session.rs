//! # Collection session
//!
//! Caller-side state around the host and ingest client: the latest latency table, the raw traces
//! recorded so far, the heatmap records the service derived from them, and a status line. Every
//! failure ends up as a human-readable status with the error flag set, no error value is handed
//! back. Collection scripts match on the status texts, keep them stable.
use crate::config::MeasureConfig;
use crate::error::Result;
use crate::host::MeasurementHost;
use crate::ingest::{HeatmapRecord, HttpTransport, TraceIngestClient, Transport};
use crate::latency::LatencyTable;
use crate::sweep::SweepTrace;
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const LATENCY_COMPLETE: &str = "Latency data collection complete!";
pub const TRACE_COMPLETE: &str = "Trace collection complete!";
pub const TRACE_RECORDED: &str = "Trace collected (not submitted).";
pub const DOWNLOAD_COMPLETE: &str = "Trace data downloaded successfully!";
pub const CLEAR_COMPLETE: &str = "All results cleared successfully!";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub is_error: bool,
}

impl Status {
    fn ok(message: impl Into<String>) -> Self {
        Status {
            message: message.into(),
            is_error: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Status {
            message: message.into(),
            is_error: true,
        }
    }
}

pub struct Session<T: Transport = HttpTransport> {
    host: MeasurementHost,
    client: TraceIngestClient<T>,
    latency_results: Option<LatencyTable>,
    traces: Vec<SweepTrace>,
    heatmaps: Vec<HeatmapRecord>,
    status: Status,
}

impl Session<HttpTransport> {
    /// Session against the service at `config.server_url`
    pub fn new(config: MeasureConfig) -> Result<Self> {
        let client = TraceIngestClient::new(&config.server_url)?;
        Ok(Session::with_client(MeasurementHost::new(config)?, client))
    }
}

impl<T: Transport> Session<T> {
    pub fn with_client(host: MeasurementHost, client: TraceIngestClient<T>) -> Self {
        Session {
            host,
            client,
            latency_results: None,
            traces: Vec::new(),
            heatmaps: Vec::new(),
            status: Status::default(),
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn latency_results(&self) -> Option<&LatencyTable> {
        self.latency_results.as_ref()
    }

    pub fn traces(&self) -> &[SweepTrace] {
        &self.traces
    }

    pub fn heatmaps(&self) -> &[HeatmapRecord] {
        &self.heatmaps
    }

    pub fn host(&self) -> &MeasurementHost {
        &self.host
    }

    fn set_status(&mut self, status: Status) -> &Status {
        if status.is_error {
            error!("{}", status.message);
        } else {
            info!("{}", status.message);
        }
        self.status = status;
        &self.status
    }

    /// Profile access latency, replacing any earlier table
    pub fn collect_latency(&mut self) -> &Status {
        self.set_status(Status::ok("Collecting latency data..."));
        self.latency_results = None;

        match self.host.profile_latency() {
            Ok(table) => {
                self.latency_results = Some(table);
                self.set_status(Status::ok(LATENCY_COMPLETE))
            }
            Err(e) => self.set_status(Status::error(format!("Error: {e}"))),
        }
    }

    /// Record a sweep trace and submit it for a heatmap
    pub fn collect_trace(&mut self) -> &Status {
        self.collect_trace_with(true)
    }

    /// Record a sweep trace, submitting it only when `submit` is set.
    ///
    /// The raw trace is kept even when submission fails, it just gets no heatmap record.
    pub fn collect_trace_with(&mut self, submit: bool) -> &Status {
        self.set_status(Status::ok("Collecting trace data..."));

        let trace = match self.host.trace_sweep() {
            Ok(trace) => trace,
            Err(e) => {
                return self.set_status(Status::error(format!(
                    "Error during trace collection: {e}"
                )));
            }
        };
        if !submit {
            self.traces.push(trace);
            return self.set_status(Status::ok(TRACE_RECORDED));
        }

        let submitted = self.client.submit(&trace);
        self.traces.push(trace);
        match submitted {
            Ok(record) => {
                self.heatmaps.push(record);
                self.set_status(Status::ok(TRACE_COMPLETE))
            }
            Err(e) => self.set_status(Status::error(format!(
                "Error during trace collection: {e}"
            ))),
        }
    }

    /// Write every trace the service holds to `path` as pretty JSON
    pub fn download_traces(&mut self, path: &Path) -> &Status {
        self.set_status(Status::ok("Downloading trace data..."));

        match self.write_traces(path) {
            Ok(count) => {
                info!("Wrote {} traces to {}", count, path.display());
                self.set_status(Status::ok(DOWNLOAD_COMPLETE))
            }
            Err(e) => self.set_status(Status::error(format!(
                "Error downloading trace data: {e}"
            ))),
        }
    }

    fn write_traces(&self, path: &Path) -> Result<usize> {
        let traces = self.client.fetch_traces()?;
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &traces).map_err(std::io::Error::from)?;
        writer.flush()?;
        Ok(traces.len())
    }

    /// Clear the service, then the local collections; local state is kept if the service fails
    pub fn clear_results(&mut self) -> &Status {
        self.set_status(Status::ok("Clearing all results..."));

        match self.client.clear_results() {
            Ok(()) => {
                self.traces.clear();
                self.heatmaps.clear();
                self.latency_results = None;
                self.set_status(Status::ok(CLEAR_COMPLETE))
            }
            Err(e) => self.set_status(Status::error(format!("Error clearing results: {e}"))),
        }
    }
}
