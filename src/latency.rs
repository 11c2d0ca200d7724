//! # Latency profiler
//!
//! For each configured working-set size, time several full passes (one byte read per line) and
//! report the median pass time in milliseconds. Every trial runs unconditionally, whatever the
//! timer resolution, and none is discarded.
use crate::clock::{Clock, as_millis_f64};
use crate::config::MeasureConfig;
use crate::error::{Error, Result};
use crate::format_size;
use crate::stats::median;
use crate::working_set::WorkingSet;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hint::black_box;

/// Median pass time (ms) per working-set size (lines), ordered by size
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatencyTable {
    pub medians: BTreeMap<usize, f64>,
}

impl LatencyTable {
    pub fn get(&self, lines: usize) -> Option<f64> {
        self.medians.get(&lines).copied()
    }

    pub fn len(&self) -> usize {
        self.medians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medians.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.medians.iter().map(|(lines, ms)| (*lines, *ms))
    }
}

pub struct LatencyProfiler<C: Clock> {
    config: MeasureConfig,
    clock: C,
}

impl<C: Clock> LatencyProfiler<C> {
    pub fn new(config: MeasureConfig, clock: C) -> Self {
        LatencyProfiler { config, clock }
    }

    /// Measure every configured size, in configured order
    pub fn profile(&mut self) -> Result<LatencyTable> {
        let mut table = LatencyTable::default();
        let sizes = self.config.latency_sizes.clone();
        for lines in sizes {
            let median_ms = self.measure_size(lines)?;
            table.medians.insert(lines, median_ms);
        }
        Ok(table)
    }

    /// Median time (ms) of `trials` full passes over a fresh working set of `lines` lines
    pub fn measure_size(&mut self, lines: usize) -> Result<f64> {
        let working_set = WorkingSet::new(lines, self.config.line_size)?;
        debug!(
            "Profiling {} lines ({}) over {} trials",
            lines,
            format_size(working_set.len_bytes() as f32),
            self.config.trials
        );

        let mut elapsed_ms = Vec::with_capacity(self.config.trials);
        let mut checksum = 0u64;
        for _ in 0..self.config.trials {
            let start = self.clock.now();
            checksum = checksum.wrapping_add(working_set.touch_all());
            let end = self.clock.now();
            elapsed_ms.push(as_millis_f64(end.saturating_sub(start)));
        }
        trace!("{} lines checksum {}", lines, black_box(checksum));

        let median_ms = median(&mut elapsed_ms)
            .ok_or_else(|| Error::WorkerExecution(format!("no trials recorded for {lines} lines")))?;
        debug!("{} lines: median {:.6} ms", lines, median_ms);
        Ok(median_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::clock::testing::ScriptedClock;

    fn config(sizes: Vec<usize>) -> MeasureConfig {
        MeasureConfig {
            latency_sizes: sizes,
            ..Default::default()
        }
    }

    /// Clock readings (start, end) pairs giving the requested per-trial elapsed times
    fn readings_for(elapsed_ms: &[f64], origin_ms: f64) -> Vec<f64> {
        let mut readings = Vec::new();
        let mut t = origin_ms;
        for ms in elapsed_ms {
            readings.push(t);
            t += ms;
            readings.push(t);
            t += 1.0;
        }
        readings
    }

    #[test]
    fn medians_from_synthetic_trial_times() {
        // size 1: sorted [1..10] -> (5 + 6) / 2
        let small = [3.0, 1.0, 4.0, 10.0, 5.0, 9.0, 2.0, 6.0, 8.0, 7.0];
        // size 10: sorted [0.5, 1, 1, 2, 2.5, 3.5, 4, 4, 8, 20] -> (2.5 + 3.5) / 2
        let large = [20.0, 2.5, 1.0, 4.0, 0.5, 3.5, 8.0, 1.0, 2.0, 4.0];
        let mut readings = readings_for(&small, 0.0);
        readings.extend(readings_for(&large, 100.0));

        let mut profiler = LatencyProfiler::new(config(vec![1, 10]), ScriptedClock::new(readings));
        let table = profiler.profile().unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(5.5));
        assert_eq!(table.get(10), Some(3.0));
        // exactly two clock reads per trial
        assert_eq!(profiler.clock.remaining(), 0);
    }

    #[test]
    fn trial_count_follows_config() {
        let mut cfg = config(vec![4]);
        cfg.trials = 3;
        let mut profiler =
            LatencyProfiler::new(cfg, ScriptedClock::new(readings_for(&[2.0, 7.0, 1.0], 0.0)));
        assert_eq!(profiler.measure_size(4).unwrap(), 2.0);
        assert_eq!(profiler.clock.remaining(), 0);
    }

    #[test]
    fn one_median_per_requested_size() {
        let sizes = vec![1, 10, 100, 1_000, 10_000];
        let mut profiler = LatencyProfiler::new(config(sizes.clone()), MonotonicClock::new());
        let table = profiler.profile().unwrap();

        assert_eq!(table.iter().map(|(lines, _)| lines).collect::<Vec<_>>(), sizes);
        assert!(table.iter().all(|(_, ms)| ms.is_finite() && ms >= 0.0));
    }

    #[test]
    fn serializes_as_size_keyed_object() {
        let mut table = LatencyTable::default();
        table.medians.insert(10, 0.25);
        table.medians.insert(1, 0.5);
        assert_eq!(
            serde_json::to_string(&table).unwrap(),
            r#"{"1":0.5,"10":0.25}"#
        );
    }
}
