// =============================================================================
// Relative Strength Index (RSI) — simple rolling averages
// =============================================================================
//
// Step 1 — delta = close_t - close_{t-1}. The first bar has no predecessor and
//          contributes a zero gain and a zero loss.
// Step 2 — avg_gain / avg_loss = arithmetic mean of the last `period` gains /
//          losses (not Wilder's smoothing).
// Step 3 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Edge cases follow IEEE arithmetic rather than special-casing:
//   - gains only   => RS = +inf => RSI = 100
//   - losses only  => RS = 0    => RSI = 0
//   - no movement  => RS = 0/0  => RSI = NaN (undefined, not an error)
// =============================================================================

use super::rolling::RollingWindow;

#[derive(Debug, Clone)]
pub struct Rsi {
    prev_close: Option<f64>,
    gains: RollingWindow,
    losses: RollingWindow,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            prev_close: None,
            gains: RollingWindow::new(period),
            losses: RollingWindow::new(period),
        }
    }

    pub fn next(&mut self, close: f64) -> f64 {
        let delta = self.prev_close.map(|prev| close - prev);
        self.prev_close = Some(close);

        let (gain, loss) = match delta {
            Some(d) if d > 0.0 => (d, 0.0),
            Some(d) if d < 0.0 => (0.0, -d),
            _ => (0.0, 0.0),
        };
        self.gains.push(gain);
        self.losses.push(loss);

        let rs = self.gains.mean() / self.losses.mean();
        100.0 - 100.0 / (1.0 + rs)
    }
}
