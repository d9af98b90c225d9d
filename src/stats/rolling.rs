//! Running statistics for streaming measurements
//!
//! Used where keeping every sample is not an option: the standalone
//! server's periodic receive-rate report.

use serde::{Deserialize, Serialize};

/// Constant-memory mean, variance, min and max (Welford's algorithm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    count: u64,
    mean: f64,
    m2: f64,
    min_value: f64,
    max_value: f64,
}

impl RollingStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
        }
    }

    pub fn add_value(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn average(&self) -> f64 {
        self.mean
    }

    /// Population variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min_value)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max_value)
    }
}

impl Default for RollingStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_tracker() {
        let stats = RollingStats::new();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.average(), 0.0);
        assert_eq!(stats.variance(), 0.0);
        assert!(stats.min().is_none());
        assert!(stats.max().is_none());
    }

    #[test]
    fn test_running_values() {
        let mut stats = RollingStats::new();
        for value in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.add_value(value);
        }
        assert_eq!(stats.count(), 8);
        assert_eq!(stats.average(), 5.0);
        assert!((stats.std_dev() - 2.0).abs() < 1e-9);
        assert_eq!(stats.min(), Some(2.0));
        assert_eq!(stats.max(), Some(9.0));
    }

    proptest! {
        #[test]
        fn prop_average_within_bounds(values in prop::collection::vec(0.0f64..1000.0, 1..100)) {
            let mut stats = RollingStats::new();
            for &v in &values { stats.add_value(v); }

            let min = stats.min().unwrap();
            let max = stats.max().unwrap();
            prop_assert_eq!(stats.count(), values.len() as u64);
            prop_assert!(min - 1e-9 <= stats.average() && stats.average() <= max + 1e-9);
            prop_assert!(stats.variance() >= 0.0);
            prop_assert!(stats.std_dev() <= max - min + 1e-9);
        }
    }
}
