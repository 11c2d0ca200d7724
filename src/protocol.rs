//! # Host/worker protocol
//!
//! One [`Command`] goes to the worker, one [`WorkerResult`] comes back, per run.
use crate::error::Error;
use crate::latency::LatencyTable;
use crate::sweep::SweepTrace;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Median pass time over each configured working-set size
    #[serde(rename = "start")]
    ProfileLatency,
    /// Sweep counts per slice over the LLC-sized working set
    #[serde(rename = "start-trace")]
    TraceSweep,
}

impl Command {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Command::ProfileLatency => "start",
            Command::TraceSweep => "start-trace",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl TryFrom<&str> for Command {
    type Error = Error;

    fn try_from(wire: &str) -> Result<Self, Self::Error> {
        match wire {
            "start" => Ok(Command::ProfileLatency),
            "start-trace" => Ok(Command::TraceSweep),
            other => Err(Error::Protocol(format!("unknown command '{other}'"))),
        }
    }
}

/// Result posted back by the worker.
///
/// On the wire a trace is `{ "type": "trace", "data": [..], "period_ms": P }`: `data` is the bare
/// count array, the period rides alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResult", from = "WireResult")]
pub enum WorkerResult {
    Latency(LatencyTable),
    Trace(SweepTrace),
    ExecutionError(String),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum WireResult {
    Latency { data: LatencyTable },
    Trace { data: Vec<u64>, period_ms: u64 },
    ExecutionError { data: String },
}

impl From<WorkerResult> for WireResult {
    fn from(result: WorkerResult) -> Self {
        match result {
            WorkerResult::Latency(data) => WireResult::Latency { data },
            WorkerResult::Trace(trace) => WireResult::Trace {
                data: trace.counts,
                period_ms: trace.period_ms,
            },
            WorkerResult::ExecutionError(data) => WireResult::ExecutionError { data },
        }
    }
}

impl From<WireResult> for WorkerResult {
    fn from(wire: WireResult) -> Self {
        match wire {
            WireResult::Latency { data } => WorkerResult::Latency(data),
            WireResult::Trace { data, period_ms } => WorkerResult::Trace(SweepTrace {
                counts: data,
                period_ms,
            }),
            WireResult::ExecutionError { data } => WorkerResult::ExecutionError(data),
        }
    }
}

impl WorkerResult {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerResult::Latency(_) => "latency",
            WorkerResult::Trace(_) => "trace",
            WorkerResult::ExecutionError(_) => "execution-error",
        }
    }

    /// Unwrap a latency result, anything else is a protocol violation
    pub fn into_latency(self) -> crate::Result<LatencyTable> {
        match self {
            WorkerResult::Latency(table) => Ok(table),
            WorkerResult::ExecutionError(msg) => Err(Error::WorkerExecution(msg)),
            other => Err(Error::Protocol(format!(
                "expected latency result, got {}",
                other.kind()
            ))),
        }
    }

    /// Unwrap a trace result, anything else is a protocol violation
    pub fn into_trace(self) -> crate::Result<SweepTrace> {
        match self {
            WorkerResult::Trace(trace) => Ok(trace),
            WorkerResult::ExecutionError(msg) => Err(Error::WorkerExecution(msg)),
            other => Err(Error::Protocol(format!(
                "expected trace result, got {}",
                other.kind()
            ))),
        }
    }
}
