//! # Sweep tracer
//!
//! Walks an LLC-sized working set back to back for the whole trace duration and counts how many
//! complete walks land in each fixed time slice. Fewer sweeps per slice means something else was
//! evicting our lines, which is the contention signal later rendered as a heatmap.
//!
//! The loop never yields: the deadline is polled with one clock read per sweep, and nothing is
//! logged until the last slice has been recorded.
use crate::clock::Clock;
use crate::config::MeasureConfig;
use crate::error::Result;
use crate::format_size;
use crate::working_set::WorkingSet;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::time::Duration;

/// Completed sweeps per slice, plus the slice period that produced them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepTrace {
    pub counts: Vec<u64>,
    pub period_ms: u64,
}

impl SweepTrace {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn min(&self) -> Option<u64> {
        self.counts.iter().copied().min()
    }

    pub fn max(&self) -> Option<u64> {
        self.counts.iter().copied().max()
    }
}

pub struct SweepTracer<C: Clock> {
    config: MeasureConfig,
    clock: C,
}

impl<C: Clock> SweepTracer<C> {
    pub fn new(config: MeasureConfig, clock: C) -> Self {
        SweepTracer { config, clock }
    }

    /// Record `trace_duration / slice_period` slices of sweep counts
    pub fn trace(&mut self) -> Result<SweepTrace> {
        let mut working_set = WorkingSet::new(self.config.sweep_lines(), self.config.line_size)?;
        working_set.pre_touch();

        let slices = self.config.slice_count();
        let period = self.config.slice_period();
        debug!(
            "Tracing {} slices of {:?} ({:?} total) over {} working set",
            slices,
            period,
            self.config.trace_duration(),
            format_size(working_set.len_bytes() as f32)
        );

        let mut counts = vec![0u64; slices];
        let mut checksum = 0u64;
        for slot in counts.iter_mut() {
            let mut sweeps = 0u64;
            let slice_start = self.clock.now();
            while self.clock.now().saturating_sub(slice_start) < period {
                checksum = checksum.wrapping_add(working_set.touch_all());
                sweeps += 1;
            }
            *slot = sweeps;
        }
        trace!("Sweep checksum {}", black_box(checksum));

        Ok(SweepTrace {
            counts,
            period_ms: self.config.slice_period_ms,
        })
    }
}
