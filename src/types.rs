// =============================================================================
// Shared types used across the kline-pulse service
// =============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kline intervals accepted by the Binance spot `/api/v3/klines` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Second1,
    Minute1,
    Minute3,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour2,
    Hour4,
    Hour6,
    Hour8,
    Hour12,
    Day1,
    Day3,
    Week1,
    Month1,
}

impl Interval {
    pub const ALL: [Interval; 16] = [
        Self::Second1,
        Self::Minute1,
        Self::Minute3,
        Self::Minute5,
        Self::Minute15,
        Self::Minute30,
        Self::Hour1,
        Self::Hour2,
        Self::Hour4,
        Self::Hour6,
        Self::Hour8,
        Self::Hour12,
        Self::Day1,
        Self::Day3,
        Self::Week1,
        Self::Month1,
    ];

    /// The literal string the venue expects in the `interval` query param.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Second1 => "1s",
            Self::Minute1 => "1m",
            Self::Minute3 => "3m",
            Self::Minute5 => "5m",
            Self::Minute15 => "15m",
            Self::Minute30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour2 => "2h",
            Self::Hour4 => "4h",
            Self::Hour6 => "6h",
            Self::Hour8 => "8h",
            Self::Hour12 => "12h",
            Self::Day1 => "1d",
            Self::Day3 => "3d",
            Self::Week1 => "1w",
            Self::Month1 => "1M",
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::Minute1
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Case matters: "1m" is a minute, "1M" is a month.
        Self::ALL
            .iter()
            .copied()
            .find(|iv| iv.as_str() == s.trim())
            .ok_or_else(|| format!("unsupported kline interval '{s}'"))
    }
}

impl TryFrom<String> for Interval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}

/// Indicator groups exposed by the query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorName {
    Rsi,
    Macd,
    Stochastic,
    Ema,
    Sma,
    AdLine,
    Obv,
    Mfi,
    Cmf,
    Aroon,
}

impl IndicatorName {
    pub const ALL: [IndicatorName; 10] = [
        Self::Rsi,
        Self::Macd,
        Self::Stochastic,
        Self::Ema,
        Self::Sma,
        Self::AdLine,
        Self::Obv,
        Self::Mfi,
        Self::Cmf,
        Self::Aroon,
    ];

    /// Canonical label used in API payloads.
    pub fn label(self) -> &'static str {
        match self {
            Self::Rsi => "RSI",
            Self::Macd => "MACD",
            Self::Stochastic => "Stochastic",
            Self::Ema => "EMA",
            Self::Sma => "SMA",
            Self::AdLine => "A/D Line",
            Self::Obv => "OBV",
            Self::Mfi => "MFI",
            Self::Cmf => "CMF",
            Self::Aroon => "Aroon",
        }
    }

    /// Comma separated list of every label, for error messages.
    pub fn choices() -> String {
        Self::ALL
            .iter()
            .map(|n| n.label())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for IndicatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for IndicatorName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|n| n.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown indicator '{wanted}'"))
    }
}
