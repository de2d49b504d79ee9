use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::warn;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV bar as returned by the klines endpoint, with the
/// housekeeping columns already dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Build a bar from the venue's millisecond epoch timestamps.
    ///
    /// Returns `None` when either timestamp is outside chrono's range.
    pub fn from_millis(
        open_time_ms: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        close_time_ms: i64,
    ) -> Option<Self> {
        Some(Self {
            open_time: Utc.timestamp_millis_opt(open_time_ms).single()?,
            close_time: Utc.timestamp_millis_opt(close_time_ms).single()?,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    /// True when high/low bracket open and close and the bar spans time.
    pub fn is_well_formed(&self) -> bool {
        self.open_time < self.close_time
            && self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Money-flow multiplier times volume. NaN when high == low.
    pub fn money_flow_volume(&self) -> f64 {
        let clv = ((self.close - self.low) - (self.high - self.close)) / (self.high - self.low);
        clv * self.volume
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("bar {index} closes at {close_time} which is not after the previous bar")]
    OutOfOrder {
        index: usize,
        close_time: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// BarSeries -- ordered, unique-by-close-time sequence of bars
// ---------------------------------------------------------------------------

/// Bars in strictly ascending close-time order.
///
/// A fresh fetch replaces the whole series; nothing appends to it in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Validate ordering and wrap `bars`.
    ///
    /// Out-of-order or duplicate close times are rejected. Bars whose OHLC
    /// values violate the high/low bracket are kept but logged, since the
    /// venue is the source of truth for prices.
    pub fn new(bars: Vec<Bar>) -> Result<Self, SeriesError> {
        for (index, pair) in bars.windows(2).enumerate() {
            if pair[1].close_time <= pair[0].close_time {
                return Err(SeriesError::OutOfOrder {
                    index: index + 1,
                    close_time: pair[1].close_time,
                });
            }
        }

        for bar in bars.iter().filter(|b| !b.is_well_formed()) {
            warn!(
                close_time = %bar.close_time,
                open = bar.open,
                high = bar.high,
                low = bar.low,
                close = bar.close,
                "bar violates OHLC invariant"
            );
        }

        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
