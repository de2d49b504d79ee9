// =============================================================================
// Stochastic Oscillator — %K (fast) and %D (slow)
// =============================================================================
//
//   %K = (close - lowest_low(n)) / (highest_high(n) - lowest_low(n)) * 100
//   %D = SMA(%K, d)
//
// A window whose highest high equals its lowest low has no range; %K is NaN
// there and %D stays NaN until that value leaves its own window.
// =============================================================================

use super::rolling::{finite_or_nan, RollingWindow};
use crate::market_data::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticValue {
    pub fast: f64,
    pub slow: f64,
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    highs: RollingWindow,
    lows: RollingWindow,
    fast_k: RollingWindow,
}

impl Stochastic {
    pub fn new(period: usize, smoothing: usize) -> Self {
        Self {
            highs: RollingWindow::new(period),
            lows: RollingWindow::new(period),
            fast_k: RollingWindow::new(smoothing),
        }
    }

    pub fn next(&mut self, bar: &Bar) -> StochasticValue {
        self.highs.push(bar.high);
        self.lows.push(bar.low);

        let lowest = self.lows.min();
        let highest = self.highs.max();
        let fast = finite_or_nan((bar.close - lowest) / (highest - lowest) * 100.0);

        self.fast_k.push(fast);
        StochasticValue {
            fast,
            slow: self.fast_k.mean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(i: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            open_time: Utc.timestamp_millis_opt(i * 60_000).unwrap(),
            close_time: Utc.timestamp_millis_opt(i * 60_000 + 59_999).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn close_at_top_of_range_is_100() {
        let mut stoch = Stochastic::new(14, 3);
        let mut last = None;
        for i in 0..20 {
            let base = 100.0 + i as f64;
            last = Some(stoch.next(&bar(i, base + 1.0, base - 1.0, base + 1.0)));
        }
        let v = last.unwrap();
        assert!((v.fast - 100.0).abs() < 1e-10);
        assert!((v.slow - 100.0).abs() < 1e-10);
    }

    #[test]
    fn warm_up_is_nan() {
        let mut stoch = Stochastic::new(14, 3);
        let values: Vec<StochasticValue> = (0..20)
            .map(|i| stoch.next(&bar(i, 110.0, 90.0, 100.0)))
            .collect();
        assert!(values[..13].iter().all(|v| v.fast.is_nan()));
        assert!((values[13].fast - 50.0).abs() < 1e-10);
        assert!(values[14].slow.is_nan());
        assert!((values[15].slow - 50.0).abs() < 1e-10);
    }

    #[test]
    fn flat_window_is_nan_not_panic() {
        let mut stoch = Stochastic::new(14, 3);
        for i in 0..30 {
            let v = stoch.next(&bar(i, 100.0, 100.0, 100.0));
            assert!(v.fast.is_nan());
            assert!(v.slow.is_nan());
        }
    }
}
