//! Temporal drift correction.

use serde::{Deserialize, Serialize};

/// Percentage correction per year past a reference year.
///
/// The rate is per operation: the standard configuration uses different
/// rates for different targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftPolicy {
    pub reference_year: i32,
    /// Percent per year, e.g. `0.1` adds 0.1% of the value per year.
    pub rate_percent: f64,
}

impl DriftPolicy {
    pub fn new(reference_year: i32, rate_percent: f64) -> Self {
        Self {
            reference_year,
            rate_percent,
        }
    }

    /// Absolute correction added to `combined` for `year`.
    pub fn adjustment(&self, combined: f64, year: i32) -> f64 {
        let delta = i64::from(year) - i64::from(self.reference_year);
        if delta <= 0 {
            return 0.0;
        }
        // |delta| < 2^33, exact in f64
        combined * delta as f64 * self.rate_percent / 100.0
    }

    pub fn adjust(&self, combined: f64, year: i32) -> f64 {
        combined + self.adjustment(combined, year)
    }
}

/// `adjusted = combined + combined * (year - reference) * rate / 100` when
/// `year` is past the reference year, otherwise `combined`.
pub fn adjust(combined: f64, year: i32, policy: &DriftPolicy) -> f64 {
    policy.adjust(combined, year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_after_reference_year() {
        let policy = DriftPolicy::new(2020, 0.1);
        let adjusted = adjust(100.0, 2023, &policy);
        assert!((adjusted - 100.3).abs() < 1e-9);
    }

    #[test]
    fn test_identity_at_or_before_reference_year() {
        let policy = DriftPolicy::new(2020, 1.0);
        assert_eq!(adjust(250.0, 2020, &policy), 250.0);
        assert_eq!(adjust(250.0, 2015, &policy), 250.0);
        assert_eq!(policy.adjustment(250.0, 1999), 0.0);
    }

    #[test]
    fn test_extreme_years_do_not_overflow() {
        let policy = DriftPolicy::new(2023, 0.1);
        assert_eq!(adjust(100.0, i32::MIN, &policy), 100.0);

        let span = DriftPolicy::new(i32::MIN, 1.0).adjustment(1.0, i32::MAX);
        assert_eq!(span, (f64::from(i32::MAX) - f64::from(i32::MIN)) / 100.0);
        assert!(span > 0.0);
    }

    #[test]
    fn test_positive_value_strictly_grows() {
        let policy = DriftPolicy::new(2020, 1.0);
        let mut previous = 80.0;
        for year in 2021..2030 {
            let adjusted = adjust(80.0, year, &policy);
            assert!(adjusted > previous);
            previous = adjusted;
        }
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let policy = DriftPolicy::new(2020, 0.0);
        assert_eq!(adjust(55.0, 2030, &policy), 55.0);
    }
}
