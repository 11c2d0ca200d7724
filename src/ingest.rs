//! # Trace ingest client
//!
//! Talks to the remote aggregation service that stores traces and renders heatmaps. The service is
//! a black box reached over three endpoints:
//!
//! - `POST /collect_trace` with `{ "trace": [..] }`, answering `{ image_url, min, max, samples? }`
//! - `GET /api/get_traces`, answering a JSON array of every stored trace
//! - `POST /api/clear_results`, answering only a status
//!
//! No call is retried. HTTP goes through the [`Transport`] trait so the client can be driven by
//! canned replies.
use crate::error::{Error, Result};
use crate::sweep::SweepTrace;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;

pub const COLLECT_TRACE_PATH: &str = "/collect_trace";
pub const GET_TRACES_PATH: &str = "/api/get_traces";
pub const CLEAR_RESULTS_PATH: &str = "/api/clear_results";

/// Status and body of an HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP surface the ingest client needs
pub trait Transport {
    fn get(&self, path: &str) -> Result<HttpReply>;
    fn post_json(&self, path: &str, body: &Value) -> Result<HttpReply>;
    fn post_empty(&self, path: &str) -> Result<HttpReply>;
}

/// Blocking `reqwest` transport against a base URL
pub struct HttpTransport {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(HttpTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn reply(response: reqwest::blocking::Response) -> Result<HttpReply> {
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpReply { status, body })
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str) -> Result<HttpReply> {
        Self::reply(self.client.get(self.url(path)).send()?)
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<HttpReply> {
        Self::reply(self.client.post(self.url(path)).json(body).send()?)
    }

    fn post_empty(&self, path: &str) -> Result<HttpReply> {
        Self::reply(self.client.post(self.url(path)).send()?)
    }
}

/// `/collect_trace` response body; counts are JSON numbers, `2` and `2.0` alike
#[derive(Debug, Deserialize)]
struct IngestResponse {
    image_url: String,
    min: f64,
    max: f64,
    samples: Option<f64>,
}

/// A sweep count reported by the service, which must be a non-negative whole number
fn reported_count(field: &str, value: f64) -> Result<u64> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
        Ok(value as u64)
    } else {
        Err(Error::Protocol(format!(
            "service reported {field} = {value}, expected a whole count"
        )))
    }
}

/// Rendering-ready summary of one submitted trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRecord {
    pub image_url: String,
    pub min: u64,
    pub max: u64,
    pub range: u64,
    pub samples: u64,
    /// Slice period the trace was recorded with
    pub period_ms: u64,
    /// `period / min`: per-sweep time of the most contended slice, `None` if `min == 0`
    pub max_time_per_sweep_ms: Option<f64>,
    /// `period / max`: per-sweep time of the least contended slice, `None` if `max == 0`
    pub min_time_per_sweep_ms: Option<f64>,
}

fn time_per_sweep(period_ms: u64, sweeps: u64) -> Option<f64> {
    (sweeps > 0).then(|| period_ms as f64 / sweeps as f64)
}

impl HeatmapRecord {
    fn from_response(response: IngestResponse, trace: &SweepTrace) -> Result<Self> {
        let min = reported_count("min", response.min)?;
        let max = reported_count("max", response.max)?;
        let range = max.checked_sub(min).ok_or_else(|| {
            Error::Protocol(format!("service reported max {max} below min {min}"))
        })?;
        // an absent or zero sample count falls back to the trace length
        let samples = match response.samples {
            Some(samples) => reported_count("samples", samples)?,
            None => 0,
        };

        Ok(HeatmapRecord {
            image_url: response.image_url,
            min,
            max,
            range,
            samples: if samples == 0 { trace.len() as u64 } else { samples },
            period_ms: trace.period_ms,
            max_time_per_sweep_ms: time_per_sweep(trace.period_ms, min),
            min_time_per_sweep_ms: time_per_sweep(trace.period_ms, max),
        })
    }
}

struct TwoDecimals(Option<f64>);

impl fmt::Display for TwoDecimals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ms) => write!(f, "{ms:.2} ms"),
            None => f.write_str("n/a"),
        }
    }
}

impl fmt::Display for HeatmapRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | min {} max {} range {} | {} samples of {} ms | sweep time {} .. {}",
            self.image_url,
            self.min,
            self.max,
            self.range,
            self.samples,
            self.period_ms,
            TwoDecimals(self.min_time_per_sweep_ms),
            TwoDecimals(self.max_time_per_sweep_ms),
        )
    }
}

pub struct TraceIngestClient<T: Transport = HttpTransport> {
    transport: T,
}

impl TraceIngestClient<HttpTransport> {
    pub fn new(server_url: &str) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new(server_url)?))
    }
}

fn ensure_success(what: &str, reply: HttpReply) -> Result<HttpReply> {
    if reply.is_success() {
        Ok(reply)
    } else {
        let body: String = reply.body.chars().take(200).collect();
        Err(Error::Network(format!(
            "{what} returned HTTP {}: {}",
            reply.status,
            body.trim()
        )))
    }
}

impl<T: Transport> TraceIngestClient<T> {
    pub fn with_transport(transport: T) -> Self {
        TraceIngestClient { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit a trace for storage and heatmap rendering
    pub fn submit(&self, trace: &SweepTrace) -> Result<HeatmapRecord> {
        debug!("Submitting {} slice trace", trace.len());
        let body = json!({ "trace": trace.counts });
        let reply = ensure_success(
            COLLECT_TRACE_PATH,
            self.transport.post_json(COLLECT_TRACE_PATH, &body)?,
        )?;

        let response: IngestResponse = serde_json::from_str(&reply.body)
            .map_err(|e| Error::Protocol(format!("bad {COLLECT_TRACE_PATH} response: {e}")))?;
        let record = HeatmapRecord::from_response(response, trace)?;
        info!("Heatmap ready at {}", record.image_url);
        Ok(record)
    }

    /// Every trace the service currently holds, as it stores them
    pub fn fetch_traces(&self) -> Result<Vec<Value>> {
        let reply = ensure_success(GET_TRACES_PATH, self.transport.get(GET_TRACES_PATH)?)?;
        match serde_json::from_str::<Value>(&reply.body) {
            Ok(Value::Array(traces)) => {
                debug!("Fetched {} stored traces", traces.len());
                Ok(traces)
            }
            Ok(other) => Err(Error::Protocol(format!(
                "{GET_TRACES_PATH} returned a non-array: {other}"
            ))),
            Err(e) => Err(Error::Protocol(format!("bad {GET_TRACES_PATH} response: {e}"))),
        }
    }

    /// Clear every stored trace and heatmap on the service
    pub fn clear_results(&self) -> Result<()> {
        ensure_success(CLEAR_RESULTS_PATH, self.transport.post_empty(CLEAR_RESULTS_PATH)?)?;
        info!("Service results cleared");
        Ok(())
    }
}
