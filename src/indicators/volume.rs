// =============================================================================
// Volume-weighted indicators — A/D Line, OBV, MFI, CMF
// =============================================================================
//
// All four read the bar's volume together with where the close sits in the
// bar's range (CLV) or how the typical price moved.
//
//   CLV  = ((close - low) - (high - close)) / (high - low)
//   MFV  = CLV * volume                        (NaN when high == low)
//   TP   = (high + low + close) / 3
// =============================================================================

use super::rolling::{finite_or_nan, RollingWindow};
use crate::market_data::Bar;

// -----------------------------------------------------------------------------
// Accumulation / Distribution Line
// -----------------------------------------------------------------------------

/// Running total of MFV.
///
/// A zero-range bar reports NaN for itself but adds nothing to the running
/// total, so one flat bar does not blank out every later value.
#[derive(Debug, Clone, Default)]
pub struct AdLine {
    total: f64,
}

impl AdLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, bar: &Bar) -> f64 {
        let mfv = bar.money_flow_volume();
        if !mfv.is_finite() {
            return f64::NAN;
        }
        self.total += mfv;
        self.total
    }
}

// -----------------------------------------------------------------------------
// On-Balance Volume
// -----------------------------------------------------------------------------

/// Volume added when the close holds or rises, subtracted when it falls.
/// The first bar has no prior close and contributes zero.
#[derive(Debug, Clone, Default)]
pub struct Obv {
    prev_close: Option<f64>,
    total: f64,
}

impl Obv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, bar: &Bar) -> f64 {
        let signed = match self.prev_close {
            Some(prev) if bar.close >= prev => bar.volume,
            Some(prev) if bar.close < prev => -bar.volume,
            _ => 0.0,
        };
        self.prev_close = Some(bar.close);
        self.total += signed;
        self.total
    }
}

// -----------------------------------------------------------------------------
// Money Flow Index
// -----------------------------------------------------------------------------

/// MFI over partial windows: the flow sums cover whatever history exists, up
/// to `period` bars, so the index is available from the second bar onward.
#[derive(Debug, Clone)]
pub struct Mfi {
    prev_typical: Option<f64>,
    positive: RollingWindow,
    negative: RollingWindow,
}

impl Mfi {
    pub fn new(period: usize) -> Self {
        Self {
            prev_typical: None,
            positive: RollingWindow::new(period),
            negative: RollingWindow::new(period),
        }
    }

    pub fn next(&mut self, bar: &Bar) -> f64 {
        let typical = bar.typical_price();
        let flow = typical * bar.volume;

        let (pos, neg) = match self.prev_typical {
            Some(prev) if typical > prev => (flow, 0.0),
            Some(prev) if typical < prev => (0.0, flow),
            _ => (0.0, 0.0),
        };
        self.prev_typical = Some(typical);
        self.positive.push(pos);
        self.negative.push(neg);

        // neg == 0 with pos > 0 gives an infinite ratio and an MFI of 100.
        let ratio = self.positive.partial_sum() / self.negative.partial_sum();
        100.0 - 100.0 / (1.0 + ratio)
    }
}

// -----------------------------------------------------------------------------
// Chaikin Money Flow
// -----------------------------------------------------------------------------

/// Rolling mean of MFV divided by rolling sum of volume.
#[derive(Debug, Clone)]
pub struct Cmf {
    mfv: RollingWindow,
    volume: RollingWindow,
}

impl Cmf {
    pub fn new(period: usize) -> Self {
        Self {
            mfv: RollingWindow::new(period),
            volume: RollingWindow::new(period),
        }
    }

    pub fn next(&mut self, bar: &Bar) -> f64 {
        self.mfv.push(finite_or_nan(bar.money_flow_volume()));
        self.volume.push(bar.volume);
        finite_or_nan(self.mfv.mean() / self.volume.sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(i: i64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar {
            open_time: Utc.timestamp_millis_opt(i * 60_000).unwrap(),
            close_time: Utc.timestamp_millis_opt(i * 60_000 + 59_999).unwrap(),
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    // ---- A/D Line --------------------------------------------------------

    #[test]
    fn ad_line_accumulates_clv_volume() {
        let mut ad = AdLine::new();
        // Close at high => CLV = 1
        assert!((ad.next(&bar(0, 10.0, 8.0, 10.0, 5.0)) - 5.0).abs() < 1e-12);
        // Close at low => CLV = -1
        assert!((ad.next(&bar(1, 10.0, 8.0, 8.0, 2.0)) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn ad_line_survives_zero_range_bar() {
        let mut ad = AdLine::new();
        ad.next(&bar(0, 10.0, 8.0, 10.0, 5.0));
        assert!(ad.next(&bar(1, 9.0, 9.0, 9.0, 4.0)).is_nan());
        // Accumulation resumes from 5.0, not from NaN.
        let v = ad.next(&bar(2, 10.0, 8.0, 10.0, 1.0));
        assert!((v - 6.0).abs() < 1e-12);
    }

    // ---- OBV ---------------------------------------------------------------

    #[test]
    fn obv_signs_volume_by_close_direction() {
        let mut obv = Obv::new();
        assert_eq!(obv.next(&bar(0, 11.0, 9.0, 10.0, 100.0)), 0.0);
        assert_eq!(obv.next(&bar(1, 12.0, 10.0, 11.0, 30.0)), 30.0);
        // Unchanged close counts as up.
        assert_eq!(obv.next(&bar(2, 12.0, 10.0, 11.0, 5.0)), 35.0);
        assert_eq!(obv.next(&bar(3, 11.0, 9.0, 10.0, 20.0)), 15.0);
    }

    #[test]
    fn obv_non_decreasing_for_rising_closes() {
        let mut obv = Obv::new();
        let mut prev = f64::NEG_INFINITY;
        for i in 0..40 {
            let close = 100.0 + (i / 3) as f64; // rises in steps, holds in between
            let v = obv.next(&bar(i, close + 1.0, close - 1.0, close, 7.0 + i as f64));
            assert!(v >= prev);
            prev = v;
        }
    }

    // ---- MFI ---------------------------------------------------------------

    #[test]
    fn mfi_first_bar_undefined_then_partial() {
        let mut mfi = Mfi::new(14);
        assert!(mfi.next(&bar(0, 11.0, 9.0, 10.0, 10.0)).is_nan());
        // Only positive flow so far => 100.
        let v = mfi.next(&bar(1, 12.0, 10.0, 11.0, 10.0));
        assert!((v - 100.0).abs() < 1e-10);
    }

    #[test]
    fn mfi_balanced_flow() {
        let mut mfi = Mfi::new(14);
        mfi.next(&bar(0, 11.0, 9.0, 10.0, 1.0));
        mfi.next(&bar(1, 12.0, 10.0, 11.0, 1.0)); // +11
        let v = mfi.next(&bar(2, 12.0, 10.0, 10.0, 1.1)); // tp 32/3, flow 11.7333
        let pos = 11.0;
        let neg = 32.0 / 3.0 * 1.1;
        let expected = 100.0 - 100.0 / (1.0 + pos / neg);
        assert!((v - expected).abs() < 1e-10);
        assert!((0.0..=100.0).contains(&v));
    }

    #[test]
    fn mfi_flat_is_nan() {
        let mut mfi = Mfi::new(14);
        for i in 0..20 {
            assert!(mfi.next(&bar(i, 100.0, 100.0, 100.0, 5.0)).is_nan());
        }
    }

    // ---- CMF ---------------------------------------------------------------

    #[test]
    fn cmf_needs_full_window() {
        let mut cmf = Cmf::new(20);
        let values: Vec<f64> = (0..25)
            .map(|i| cmf.next(&bar(i, 11.0, 9.0, 11.0, 2.0)))
            .collect();
        assert!(values[..19].iter().all(|v| v.is_nan()));
        // mean(MFV) = 2, sum(volume) = 40
        assert!((values[19] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn cmf_nan_while_zero_range_bar_in_window() {
        let mut cmf = Cmf::new(3);
        cmf.next(&bar(0, 11.0, 9.0, 10.0, 1.0));
        cmf.next(&bar(1, 10.0, 10.0, 10.0, 1.0));
        assert!(cmf.next(&bar(2, 11.0, 9.0, 10.0, 1.0)).is_nan());
        assert!(cmf.next(&bar(3, 11.0, 9.0, 10.0, 1.0)).is_nan());
        assert!(!cmf.next(&bar(4, 11.0, 9.0, 10.0, 1.0)).is_nan());
    }
}
