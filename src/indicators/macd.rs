// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   MACD      = EMA(fast) - EMA(slow)
//   Signal    = EMA(signal) of MACD
//   Histogram = MACD - Signal
//
// All three legs inherit the EMA's seed-from-first-value behaviour, so they are
// defined from the first bar and converge over the slow period.
// =============================================================================

use super::ema::Ema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
        }
    }

    pub fn next(&mut self, close: f64) -> MacdValue {
        let macd = self.fast.next(close) - self.slow.next(close);
        let signal = self.signal.next(macd);
        MacdValue {
            macd,
            signal,
            histogram: macd - signal,
        }
    }
}
