//! # Working set
//!
//! A freshly allocated byte region sized to a whole number of cache lines. Every pass touches one
//! byte per line at offsets `0, stride, 2 * stride, ...`, so each touch lands in a distinct line.
//! Reads go through [`std::ptr::read_volatile`] and are folded into a checksum the caller hands to
//! [`std::hint::black_box`], which keeps the optimizer from eliding the walk.
use crate::error::{Error, Result};
use crate::format_size;
use std::ptr;

pub struct WorkingSet {
    buf: Vec<u8>,
    lines: usize,
    stride: usize,
}

impl WorkingSet {
    /// Allocate `lines * stride` zeroed bytes
    pub fn new(lines: usize, stride: usize) -> Result<Self> {
        if lines == 0 || stride == 0 {
            return Err(Error::WorkerExecution(format!(
                "working set needs at least one line of non-zero stride (lines={lines}, stride={stride})"
            )));
        }
        let len = lines.checked_mul(stride).ok_or_else(|| {
            Error::WorkerExecution(format!("{lines} lines of {stride} bytes overflows usize"))
        })?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|e| {
            Error::WorkerExecution(format!(
                "couldn't allocate {} working set: {}",
                format_size(len as f32),
                e
            ))
        })?;
        buf.resize(len, 0);

        Ok(WorkingSet { buf, lines, stride })
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn len_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Write `1` into the first byte of every line so the region is resident before tracing
    pub fn pre_touch(&mut self) {
        let base = self.buf.as_mut_ptr();
        for offset in (0..self.buf.len()).step_by(self.stride) {
            // SAFETY: offset < buf.len()
            unsafe { ptr::write_volatile(base.add(offset), 1) };
        }
    }

    /// Read the first byte of every line once, in increasing offset order
    #[inline(never)]
    pub fn touch_all(&self) -> u64 {
        let base = self.buf.as_ptr();
        let mut checksum = 0u64;
        for offset in (0..self.buf.len()).step_by(self.stride) {
            // SAFETY: offset < buf.len()
            let byte = unsafe { ptr::read_volatile(base.add(offset)) };
            checksum = checksum.wrapping_add(byte as u64);
        }
        checksum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_to_whole_lines() {
        let ws = WorkingSet::new(100, 64).unwrap();
        assert_eq!(ws.lines(), 100);
        assert_eq!(ws.stride(), 64);
        assert_eq!(ws.len_bytes(), 6400);
    }

    #[test]
    fn fresh_set_reads_zero() {
        let ws = WorkingSet::new(16, 64).unwrap();
        assert_eq!(ws.touch_all(), 0);
    }

    #[test]
    fn pre_touch_writes_one_byte_per_line() {
        let mut ws = WorkingSet::new(37, 64).unwrap();
        ws.pre_touch();
        // one touch per line, each reading back the pre-touch value
        assert_eq!(ws.touch_all(), 37);
        assert_eq!(ws.buf.iter().filter(|b| **b != 0).count(), 37);
        assert!(ws.buf.iter().enumerate().all(|(i, b)| (*b != 0) == (i % 64 == 0)));
    }

    #[test]
    fn rejects_empty_and_overflowing_sets() {
        assert!(matches!(WorkingSet::new(0, 64), Err(Error::WorkerExecution(_))));
        assert!(matches!(WorkingSet::new(1, 0), Err(Error::WorkerExecution(_))));
        assert!(matches!(
            WorkingSet::new(usize::MAX, 64),
            Err(Error::WorkerExecution(_))
        ));
    }
}
