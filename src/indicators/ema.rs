// =============================================================================
// Moving Averages — Simple (SMA) and Exponential (EMA)
// =============================================================================
//
// SMA(n) is the arithmetic mean of the last `n` closes and is undefined until
// `n` closes have been seen.
//
// EMA(n) uses the span form:
//   alpha = 2 / (n + 1)
//   EMA_0 = close_0
//   EMA_t = (1 - alpha) * EMA_{t-1} + alpha * close_t
//
// Seeding from the first close (no SMA warm-up, no bias correction) makes the
// EMA defined from the very first bar; it converges over roughly `n` bars.
// =============================================================================

use super::rolling::RollingWindow;

/// Streaming simple moving average.
#[derive(Debug, Clone)]
pub struct Sma {
    window: RollingWindow,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            window: RollingWindow::new(period),
        }
    }

    pub fn next(&mut self, value: f64) -> f64 {
        self.window.push(value);
        self.window.mean()
    }
}

/// Streaming exponential moving average.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    current: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period.max(1) as f64 + 1.0),
            current: None,
        }
    }

    pub fn next(&mut self, value: f64) -> f64 {
        let ema = match self.current {
            None => value,
            Some(prev) => (1.0 - self.alpha) * prev + self.alpha * value,
        };
        self.current = Some(ema);
        ema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_first_values_undefined() {
        let mut sma = Sma::new(20);
        let out: Vec<f64> = (1..=30).map(|x| sma.next(x as f64)).collect();
        assert!(out[..19].iter().all(|v| v.is_nan()));
        // Mean of 1..=20
        assert!((out[19] - 10.5).abs() < 1e-10);
        // Mean of 11..=30
        assert!((out[29] - 20.5).abs() < 1e-10);
    }

    #[test]
    fn ema_seeded_from_first_value() {
        let mut ema = Ema::new(5);
        assert!((ema.next(10.0) - 10.0).abs() < 1e-12);
        // alpha = 1/3
        let second = ema.next(13.0);
        assert!((second - 11.0).abs() < 1e-12);
    }

    #[test]
    fn ema_known_values() {
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let mut ema = Ema::new(5);
        let got: Vec<f64> = closes.iter().map(|&c| ema.next(c)).collect();

        let alpha = 2.0 / 6.0;
        let mut expected = closes[0];
        assert!((got[0] - expected).abs() < 1e-12);
        for (i, &c) in closes.iter().enumerate().skip(1) {
            expected = (1.0 - alpha) * expected + alpha * c;
            assert!((got[i] - expected).abs() < 1e-10, "got {}, expected {expected}", got[i]);
        }
    }

    #[test]
    fn ema_flat_series_stays_flat() {
        let mut ema = Ema::new(20);
        for _ in 0..50 {
            assert!((ema.next(100.0) - 100.0).abs() < 1e-10);
        }
    }
}
