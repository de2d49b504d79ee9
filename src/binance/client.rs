// =============================================================================
// Binance REST API Client — public klines endpoint
// =============================================================================
//
// Only the unsigned `/api/v3/klines` endpoint is used, so no API key or
// signature is ever sent. The request never sets `limit`; the venue's default
// window is what the rest of the pipeline works with.
//
// Failures are returned as `FetchError` values so the polling loop can log and
// carry on. There is no retry here; retry policy belongs to the loop.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::binance::rate_limit::RateLimitTracker;
use crate::market_data::{Bar, BarSeries, SeriesError};
use crate::types::Interval;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Upstream error bodies are cut to this many characters before being kept.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid instrument symbol '{0}'")]
    InvalidSymbol(String),

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream rejected request with status {status}: {body}")]
    UpstreamRejected { status: StatusCode, body: String },

    #[error("malformed klines payload: {0}")]
    MalformedPayload(String),

    #[error("invalid bar series: {0}")]
    InvalidSeries(#[from] SeriesError),
}

impl FetchError {
    /// Transport failures and 5xx answers are worth another attempt within the
    /// same cycle. A 4xx (including 429 and 418) means back off until the next
    /// cycle at the earliest.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::UpstreamRejected { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// Binance REST client for public market data.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient`.
    ///
    /// # Arguments
    /// * `base_url`   — e.g. "https://api.binance.com" (no trailing slash needed).
    /// * `timeout`    — whole-request timeout, connect included.
    /// * `rate_limit` — tracker updated from every response's headers.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        rate_limit: Arc<RateLimitTracker>,
    ) -> anyhow::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit,
        })
    }

    pub fn rate_limit(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limit
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines for `symbol` at `interval`.
    ///
    /// Bars come back ascending by close time; the last one is normally still
    /// in progress.
    #[instrument(skip(self), name = "binance::fetch_bars")]
    pub async fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<BarSeries, FetchError> {
        let symbol = normalize_symbol(symbol)?;
        let url = format!("{}/api/v3/klines", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("interval", interval.as_str())])
            .send()
            .await?;

        self.rate_limit.update_from_headers(resp.headers());

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(FetchError::UpstreamRejected { status, body });
        }

        let series = parse_klines(&body)?;
        debug!(symbol = %symbol, %interval, count = series.len(), "klines fetched");
        Ok(series)
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Parsing helpers
// -----------------------------------------------------------------------------

/// Upper-case `symbol` and check it looks like a venue instrument id.
pub fn normalize_symbol(symbol: &str) -> Result<String, FetchError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FetchError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Parse the klines array-of-arrays body into a [`BarSeries`].
///
/// Array indices:
///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades,
///   [9] takerBuyBaseVolume, [10] takerBuyQuoteVolume, [11] ignore
///
/// Only the first seven are kept.
pub fn parse_klines(body: &str) -> Result<BarSeries, FetchError> {
    let root: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedPayload(format!("invalid JSON: {e}")))?;

    let raw = root
        .as_array()
        .ok_or_else(|| FetchError::MalformedPayload("klines response is not an array".into()))?;

    let mut bars = Vec::with_capacity(raw.len());

    for entry in raw {
        let arr = entry
            .as_array()
            .ok_or_else(|| FetchError::MalformedPayload("kline entry is not an array".into()))?;

        if arr.len() < 7 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time = parse_i64(&arr[0], "openTime")?;
        let open = parse_str_f64(&arr[1], "open")?;
        let high = parse_str_f64(&arr[2], "high")?;
        let low = parse_str_f64(&arr[3], "low")?;
        let close = parse_str_f64(&arr[4], "close")?;
        let volume = parse_str_f64(&arr[5], "volume")?;
        let close_time = parse_i64(&arr[6], "closeTime")?;

        let bar = Bar::from_millis(open_time, open, high, low, close, volume, close_time)
            .ok_or_else(|| {
                FetchError::MalformedPayload(format!(
                    "timestamp out of range: open {open_time}, close {close_time}"
                ))
            })?;
        bars.push(bar);
    }

    Ok(BarSeries::new(bars)?)
}

fn parse_i64(val: &serde_json::Value, name: &str) -> Result<i64, FetchError> {
    val.as_i64()
        .ok_or_else(|| FetchError::MalformedPayload(format!("field {name} is not an integer: {val}")))
}

/// Binance sends prices and volumes as JSON strings; accept numbers too.
fn parse_str_f64(val: &serde_json::Value, name: &str) -> Result<f64, FetchError> {
    match val {
        serde_json::Value::String(s) => s.parse::<f64>().map_err(|_| {
            FetchError::MalformedPayload(format!("failed to parse {name} as f64: {s}"))
        }),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FetchError::MalformedPayload(format!("field {name} is not a valid f64"))),
        _ => Err(FetchError::MalformedPayload(format!(
            "field {name} has unexpected JSON type"
        ))),
    }
}
