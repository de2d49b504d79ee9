// =============================================================================
// Aroon Oscillator
// =============================================================================
//
//   up   = (n - periods_since_highest_high) / n * 100
//   down = (n - periods_since_lowest_low)   / n * 100
//   osc  = up - down
//
// Both legs look at the last `n` bars (current bar included), so the number of
// periods since an extreme ranges over 0..n-1. When the extreme value appears
// more than once, the earliest occurrence counts. Only the oscillator is
// reported; the individual legs are not exposed.
// =============================================================================

use super::rolling::RollingWindow;
use crate::market_data::Bar;

#[derive(Debug, Clone)]
pub struct Aroon {
    highs: RollingWindow,
    lows: RollingWindow,
}

impl Aroon {
    pub fn new(period: usize) -> Self {
        Self {
            highs: RollingWindow::new(period),
            lows: RollingWindow::new(period),
        }
    }

    pub fn next(&mut self, bar: &Bar) -> f64 {
        self.highs.push(bar.high);
        self.lows.push(bar.low);

        let (Some(high_at), Some(low_at)) = (self.highs.argmax(), self.lows.argmin()) else {
            return f64::NAN;
        };

        let n = self.highs.period();
        let leg = |offset: usize| {
            let since = (n - 1 - offset) as f64;
            (n as f64 - since) / n as f64 * 100.0
        };
        leg(high_at) - leg(low_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(i: i64, high: f64, low: f64) -> Bar {
        Bar {
            open_time: Utc.timestamp_millis_opt(i * 60_000).unwrap(),
            close_time: Utc.timestamp_millis_opt(i * 60_000 + 59_999).unwrap(),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1.0,
        }
    }

    #[test]
    fn undefined_during_warm_up() {
        let mut aroon = Aroon::new(25);
        for i in 0..24 {
            assert!(aroon.next(&bar(i, 10.0 + i as f64, 9.0 + i as f64)).is_nan());
        }
        assert!(!aroon.next(&bar(24, 40.0, 30.0)).is_nan());
    }

    #[test]
    fn uptrend_is_strongly_positive() {
        let mut aroon = Aroon::new(25);
        let mut last = f64::NAN;
        for i in 0..30 {
            last = aroon.next(&bar(i, 10.0 + i as f64, 9.0 + i as f64));
        }
        // Newest high => up = 100; oldest low => down = 4.
        assert!((last - 96.0).abs() < 1e-10);
    }

    #[test]
    fn downtrend_is_strongly_negative() {
        let mut aroon = Aroon::new(25);
        let mut last = f64::NAN;
        for i in 0..30 {
            last = aroon.next(&bar(i, 100.0 - i as f64, 99.0 - i as f64));
        }
        assert!((last + 96.0).abs() < 1e-10);
    }

    #[test]
    fn flat_market_is_neutral() {
        let mut aroon = Aroon::new(25);
        let mut last = f64::NAN;
        for i in 0..30 {
            last = aroon.next(&bar(i, 50.0, 50.0));
        }
        assert_eq!(last, 0.0);
    }
}
