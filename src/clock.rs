use std::time::{Duration, Instant};

/// Monotonic time source polled by the measurement loops
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed origin
    fn now(&mut self) -> Duration;
}

/// `Instant`-backed clock, origin is the moment of construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline(always)]
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }
}

/// Convert a duration to fractional milliseconds
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Clock;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Clock replaying a fixed list of readings, in milliseconds
    pub struct ScriptedClock {
        readings: VecDeque<f64>,
    }

    impl ScriptedClock {
        pub fn new(readings_ms: impl IntoIterator<Item = f64>) -> Self {
            ScriptedClock {
                readings: readings_ms.into_iter().collect(),
            }
        }

        pub fn remaining(&self) -> usize {
            self.readings.len()
        }
    }

    impl Clock for ScriptedClock {
        fn now(&mut self) -> Duration {
            let ms = self
                .readings
                .pop_front()
                .expect("scripted clock ran out of readings");
            Duration::from_nanos((ms * 1_000_000.0).round() as u64)
        }
    }
}
