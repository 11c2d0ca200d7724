use cache_trace_rs::clock::Clock;
use cache_trace_rs::error::Result;
use cache_trace_rs::ingest::{HttpReply, Transport};
use cache_trace_rs::{MeasureConfig, SweepTrace, SweepTracer, TraceIngestClient};
use proptest::prelude::*;
use serde_json::Value;
use std::time::Duration;

/// Clock advancing a fixed step on every read
struct SteppingClock {
    now: Duration,
    step: Duration,
}

impl Clock for SteppingClock {
    fn now(&mut self) -> Duration {
        self.now += self.step;
        self.now
    }
}

/// Service that stores nothing and reports fixed stats without a sample count
struct StatsOnly;

impl Transport for StatsOnly {
    fn get(&self, _path: &str) -> Result<HttpReply> {
        unreachable!()
    }

    fn post_json(&self, _path: &str, _body: &Value) -> Result<HttpReply> {
        Ok(HttpReply {
            status: 200,
            body: r#"{"image_url":"/static/heatmaps/t.png","min":3,"max":12}"#.to_string(),
        })
    }

    fn post_empty(&self, _path: &str) -> Result<HttpReply> {
        unreachable!()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn trace_length_is_duration_over_period(
        period_ms in 1u64..20,
        slices in 1u64..40,
        extra_ms in 0u64..20,
        step_us in 100u64..5_000,
    ) {
        let duration_ms = period_ms * slices + extra_ms.min(period_ms - 1);
        let config = MeasureConfig {
            llc_size: 64 * 16,
            trace_duration_ms: duration_ms,
            slice_period_ms: period_ms,
            ..Default::default()
        };
        let clock = SteppingClock { now: Duration::ZERO, step: Duration::from_micros(step_us) };
        let trace = SweepTracer::new(config, clock).trace().unwrap();

        prop_assert_eq!(trace.len() as u64, slices);
        prop_assert_eq!(trace.period_ms, period_ms);
        // every slice sees the same number of fixed-step polls
        let expected = (period_ms * 1_000 - 1) / step_us;
        prop_assert!(trace.counts.iter().all(|c| *c == expected));
    }

    #[test]
    fn missing_sample_count_defaults_to_trace_length(
        counts in prop::collection::vec(0u64..500, 1..2_000usize),
        period_ms in 1u64..100,
    ) {
        let client = TraceIngestClient::with_transport(StatsOnly);
        let trace = SweepTrace { counts, period_ms };
        let record = client.submit(&trace).unwrap();

        prop_assert_eq!(record.samples, trace.len() as u64);
        prop_assert_eq!(record.range, 9);
        prop_assert_eq!(record.max_time_per_sweep_ms, Some(period_ms as f64 / 3.0));
        prop_assert_eq!(record.min_time_per_sweep_ms, Some(period_ms as f64 / 12.0));
    }
}
