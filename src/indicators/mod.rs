// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Every indicator is a small streaming state: feed it bars in close-time order
// and it returns the value at that bar. Undefined values are NaN; they are not
// errors and they travel all the way to the snapshot and the API.
//
// `incremental::IncrementalEngine` keeps one `IndicatorState` alive across
// polling cycles. The test-only `compute` folds a fresh state over a whole
// series and is the batch result the engine must reproduce.

pub mod aroon;
pub mod ema;
pub mod incremental;
pub mod macd;
pub mod rolling;
pub mod rsi;
pub mod stochastic;
pub mod volume;

use chrono::{DateTime, Utc};

use crate::market_data::Bar;

use self::aroon::Aroon;
use self::ema::{Ema, Sma};
use self::macd::Macd;
use self::rsi::Rsi;
use self::stochastic::Stochastic;
use self::volume::{AdLine, Cmf, Mfi, Obv};

pub const RSI_PERIOD: usize = 14;
pub const SMA_PERIOD: usize = 20;
pub const EMA_PERIOD: usize = 20;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const STOCH_PERIOD: usize = 14;
pub const STOCH_SMOOTHING: usize = 3;
pub const MFI_PERIOD: usize = 14;
pub const CMF_PERIOD: usize = 20;
pub const AROON_PERIOD: usize = 25;

// =============================================================================
// Enriched rows
// =============================================================================

/// One bar's close joined with every indicator value at that bar.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub close_time: DateTime<Utc>,
    pub close: f64,
    pub rsi: f64,
    pub cmf: f64,
    pub mfi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub obv: f64,
    pub ad_line: f64,
    pub fast_stochastic: f64,
    pub slow_stochastic: f64,
    pub ema: f64,
    pub sma: f64,
    pub aroon: f64,
}

#[cfg(test)]
impl EnrichedRow {
    /// Compare two rows treating NaN as equal to NaN.
    pub fn same_values(&self, other: &Self) -> bool {
        fn eq(a: f64, b: f64) -> bool {
            (a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-9 * a.abs().max(1.0)
        }
        self.close_time == other.close_time
            && eq(self.close, other.close)
            && eq(self.rsi, other.rsi)
            && eq(self.cmf, other.cmf)
            && eq(self.mfi, other.mfi)
            && eq(self.macd, other.macd)
            && eq(self.macd_signal, other.macd_signal)
            && eq(self.macd_histogram, other.macd_histogram)
            && eq(self.obv, other.obv)
            && eq(self.ad_line, other.ad_line)
            && eq(self.fast_stochastic, other.fast_stochastic)
            && eq(self.slow_stochastic, other.slow_stochastic)
            && eq(self.ema, other.ema)
            && eq(self.sma, other.sma)
            && eq(self.aroon, other.aroon)
    }
}

/// The enriched table: one row per bar, ascending by close time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedSnapshot {
    pub rows: Vec<EnrichedRow>,
}

impl EnrichedSnapshot {
    pub fn new(rows: Vec<EnrichedRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The last `n` rows (all of them when fewer exist).
    pub fn tail(&self, n: usize) -> &[EnrichedRow] {
        let start = self.rows.len().saturating_sub(n);
        &self.rows[start..]
    }

    pub fn last(&self) -> Option<&EnrichedRow> {
        self.rows.last()
    }
}

// =============================================================================
// Indicator state
// =============================================================================

/// Combined streaming state of the whole indicator catalogue.
///
/// Cloning is cheap: the largest buffer held is `AROON_PERIOD` values.
#[derive(Debug, Clone)]
pub struct IndicatorState {
    rsi: Rsi,
    sma: Sma,
    ema: Ema,
    macd: Macd,
    stochastic: Stochastic,
    ad_line: AdLine,
    obv: Obv,
    mfi: Mfi,
    cmf: Cmf,
    aroon: Aroon,
}

impl Default for IndicatorState {
    fn default() -> Self {
        Self {
            rsi: Rsi::new(RSI_PERIOD),
            sma: Sma::new(SMA_PERIOD),
            ema: Ema::new(EMA_PERIOD),
            macd: Macd::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL),
            stochastic: Stochastic::new(STOCH_PERIOD, STOCH_SMOOTHING),
            ad_line: AdLine::new(),
            obv: Obv::new(),
            mfi: Mfi::new(MFI_PERIOD),
            cmf: Cmf::new(CMF_PERIOD),
            aroon: Aroon::new(AROON_PERIOD),
        }
    }
}

impl IndicatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every indicator by one bar.
    pub fn next(&mut self, bar: &Bar) -> EnrichedRow {
        let macd = self.macd.next(bar.close);
        let stoch = self.stochastic.next(bar);

        EnrichedRow {
            close_time: bar.close_time,
            close: bar.close,
            rsi: self.rsi.next(bar.close),
            cmf: self.cmf.next(bar),
            mfi: self.mfi.next(bar),
            macd: macd.macd,
            macd_signal: macd.signal,
            macd_histogram: macd.histogram,
            obv: self.obv.next(bar),
            ad_line: self.ad_line.next(bar),
            fast_stochastic: stoch.fast,
            slow_stochastic: stoch.slow,
            ema: self.ema.next(bar.close),
            sma: self.sma.next(bar.close),
            aroon: self.aroon.next(bar),
        }
    }
}

/// Compute the full indicator catalogue over `series`.
///
/// Output rows align one-to-one with the input bars.
#[cfg(test)]
pub fn compute(series: &crate::market_data::BarSeries) -> EnrichedSnapshot {
    let mut state = IndicatorState::new();
    let rows = series.bars().iter().map(|bar| state.next(bar)).collect();
    EnrichedSnapshot::new(rows)
}
