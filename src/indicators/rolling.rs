// =============================================================================
// Rolling Window — fixed-size trailing buffer shared by the windowed indicators
// =============================================================================
//
// Aggregates follow the "full window or nothing" rule: a statistic over a
// window that has not yet seen `period` values, or that contains a NaN, is
// itself NaN. `partial_sum` is the one exception and exists for MFI, which
// accumulates over whatever history is available.
// =============================================================================

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    period: usize,
}

impl RollingWindow {
    /// A zero period is treated as one.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            values: VecDeque::with_capacity(period + 1),
            period,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Append `value`, evicting the oldest entry once the window is full.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.period {
            self.values.pop_front();
        }
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.period
    }

    fn is_defined(&self) -> bool {
        self.is_full() && !self.values.iter().any(|v| v.is_nan())
    }

    pub fn sum(&self) -> f64 {
        if !self.is_defined() {
            return f64::NAN;
        }
        self.values.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        self.sum() / self.period as f64
    }

    /// Sum of whatever is currently held, full or not.
    pub fn partial_sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn max(&self) -> f64 {
        if !self.is_defined() {
            return f64::NAN;
        }
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        if !self.is_defined() {
            return f64::NAN;
        }
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Offset (0 = oldest) of the first occurrence of the window maximum.
    pub fn argmax(&self) -> Option<usize> {
        self.arg_extreme(|candidate, best| candidate > best)
    }

    /// Offset (0 = oldest) of the first occurrence of the window minimum.
    pub fn argmin(&self) -> Option<usize> {
        self.arg_extreme(|candidate, best| candidate < best)
    }

    fn arg_extreme(&self, better: impl Fn(f64, f64) -> bool) -> Option<usize> {
        if !self.is_defined() {
            return None;
        }
        let mut best_idx = 0;
        for (idx, &v) in self.values.iter().enumerate().skip(1) {
            if better(v, self.values[best_idx]) {
                best_idx = idx;
            }
        }
        Some(best_idx)
    }
}

/// Collapse infinities into NaN so every undefined value looks the same.
pub fn finite_or_nan(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_until_full() {
        let mut w = RollingWindow::new(3);
        w.push(1.0);
        w.push(2.0);
        assert!(w.sum().is_nan());
        assert!((w.partial_sum() - 3.0).abs() < 1e-12);
        w.push(3.0);
        assert!((w.mean() - 2.0).abs() < 1e-12);
        w.push(4.0);
        assert!((w.sum() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn nan_poisons_only_while_inside() {
        let mut w = RollingWindow::new(2);
        w.push(f64::NAN);
        w.push(1.0);
        assert!(w.mean().is_nan());
        assert!(w.argmax().is_none());
        w.push(3.0);
        assert!((w.mean() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn arg_extremes_prefer_oldest_tie() {
        let mut w = RollingWindow::new(4);
        for v in [5.0, 7.0, 7.0, 1.0] {
            w.push(v);
        }
        assert_eq!(w.argmax(), Some(1));
        assert_eq!(w.argmin(), Some(3));
        assert!((w.max() - 7.0).abs() < 1e-12);
        assert!((w.min() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_period_clamped() {
        let mut w = RollingWindow::new(0);
        assert_eq!(w.period(), 1);
        w.push(2.0);
        assert!((w.sum() - 2.0).abs() < 1e-12);
    }
}
