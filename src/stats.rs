//! Running statistics for servo telemetry (offset, frequency error, link delay).
//!
//! Values are folded in one at a time using Welford's online update, so an
//! accumulator never stores samples and can run for the lifetime of the daemon.

use serde::{Deserialize, Serialize};

/// Online accumulator of count/min/max/mean and second moments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatAccumulator {
    n: u64,
    min: f64,
    max: f64,
    mean: f64,
    sum_sq: f64,
    sum_dev_sq: f64,
}

/// Point-in-time view of a [`StatAccumulator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub num: u64,
    pub min: f64,
    pub max: f64,
    pub max_abs: f64,
    pub mean: f64,
    pub rms: f64,
    pub stdev: f64,
}

impl StatAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        let old_mean = self.mean;

        if self.n == 0 || value > self.max {
            self.max = value;
        }
        if self.n == 0 || value < self.min {
            self.min = value;
        }

        self.n += 1;
        self.mean = old_mean + (value - old_mean) / self.n as f64;
        self.sum_sq += value * value;
        self.sum_dev_sq += (value - old_mean) * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Summarise the accumulated values.
    ///
    /// With no samples, `rms` and `stdev` come out as NaN (0/0). Callers check
    /// `num` before trusting them.
    pub fn snapshot(&self) -> StatSnapshot {
        let n = self.n as f64;
        StatSnapshot {
            num: self.n,
            min: self.min,
            max: self.max,
            max_abs: self.max.max(-self.min),
            mean: self.mean,
            rms: (self.sum_sq / n).sqrt(),
            stdev: (self.sum_dev_sq / n).sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_moments() {
        let mut acc = StatAccumulator::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.add(v);
        }
        let snap = acc.snapshot();
        assert_eq!(snap.num, 8);
        assert_eq!(snap.min, 2.0);
        assert_eq!(snap.max, 9.0);
        assert_eq!(snap.max_abs, 9.0);
        assert!((snap.mean - 5.0).abs() < 1e-12);
        // Population stdev of this classic set is exactly 2
        assert!((snap.stdev - 2.0).abs() < 1e-12);
        let rms = (232.0f64 / 8.0).sqrt();
        assert!((snap.rms - rms).abs() < 1e-12);
    }

    #[test]
    fn test_max_abs_uses_negative_min() {
        let mut acc = StatAccumulator::new();
        acc.add(-120.0);
        acc.add(30.0);
        let snap = acc.snapshot();
        assert_eq!(snap.min, -120.0);
        assert_eq!(snap.max, 30.0);
        assert_eq!(snap.max_abs, 120.0);
    }

    #[test]
    fn test_single_sample_has_zero_stdev() {
        let mut acc = StatAccumulator::new();
        acc.add(55.0);
        let snap = acc.snapshot();
        assert_eq!(snap.mean, 55.0);
        assert_eq!(snap.stdev, 0.0);
        assert_eq!(snap.rms, 55.0);
    }

    #[test]
    fn test_empty_snapshot_is_left_to_caller() {
        let acc = StatAccumulator::new();
        let snap = acc.snapshot();
        assert_eq!(snap.num, 0);
        assert!(snap.rms.is_nan());
        assert!(snap.stdev.is_nan());
    }

    #[test]
    fn test_reset() {
        let mut acc = StatAccumulator::new();
        acc.add(1.0);
        acc.add(3.0);
        acc.reset();
        assert_eq!(acc.count(), 0);
        acc.add(-4.0);
        let snap = acc.snapshot();
        assert_eq!(snap.min, -4.0);
        assert_eq!(snap.max, -4.0);
    }
}
