// =============================================================================
// Runtime Configuration — service settings with atomic save
// =============================================================================
//
// Every tunable lives here: which instrument and interval to poll, how often,
// where the snapshot goes, and how hard to retry a failed fetch.
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file. Environment variables override the file.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::binance::client::DEFAULT_BASE_URL;
use crate::types::Interval;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_route_label() -> String {
    "BTC-USDT".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_snapshot_path() -> String {
    "Kline.csv".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_history_capacity() -> usize {
    1000
}

fn default_max_used_weight() -> u32 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

// =============================================================================
// RetryPolicy
// =============================================================================

/// Bounded exponential backoff applied by the poller around each fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per cycle, first try included. Zero is treated as one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles on each further attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Top-level configuration for the kline-pulse service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // --- Instrument ---------------------------------------------------------

    /// Venue symbol, e.g. "BTCUSDT".
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Path segment the query API serves the instrument under, e.g. "BTC-USDT".
    #[serde(default = "default_route_label")]
    pub route_label: String,

    /// Kline interval requested from the venue.
    #[serde(default)]
    pub interval: Interval,

    // --- Upstream -----------------------------------------------------------

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Largest used-weight reading at which another request is still sent.
    #[serde(default = "default_max_used_weight")]
    pub max_used_weight: u32,

    #[serde(default)]
    pub retry: RetryPolicy,

    // --- Polling & persistence ----------------------------------------------

    /// Pause between the end of one cycle and the start of the next.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Committed rows kept by the incremental engine.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    // --- Query API ----------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            route_label: default_route_label(),
            interval: Interval::default(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_used_weight: default_max_used_weight(),
            retry: RetryPolicy::default(),
            poll_interval_secs: default_poll_interval_secs(),
            snapshot_path: default_snapshot_path(),
            history_capacity: default_history_capacity(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            interval = %config.interval,
            "config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }

    /// Apply `KLINE_PULSE_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(symbol) = lookup("KLINE_PULSE_SYMBOL") {
            self.symbol = symbol.trim().to_uppercase();
        }
        if let Some(label) = lookup("KLINE_PULSE_ROUTE_LABEL") {
            self.route_label = label.trim().to_string();
        }
        if let Some(raw) = lookup("KLINE_PULSE_INTERVAL") {
            match raw.parse() {
                Ok(iv) => self.interval = iv,
                Err(e) => warn!(error = %e, "ignoring KLINE_PULSE_INTERVAL"),
            }
        }
        if let Some(addr) = lookup("KLINE_PULSE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(path) = lookup("KLINE_PULSE_SNAPSHOT") {
            self.snapshot_path = path;
        }
        if let Some(raw) = lookup("KLINE_PULSE_POLL_SECS") {
            match raw.trim().parse() {
                Ok(secs) => self.poll_interval_secs = secs,
                Err(e) => warn!(error = %e, value = %raw, "ignoring KLINE_PULSE_POLL_SECS"),
            }
        }
    }

    /// Reject settings the service cannot start with.
    ///
    /// `route_label` becomes a literal path segment of the query API, so it
    /// must be non-empty, limited to `[A-Za-z0-9_-]`, and must not shadow
    /// `/health`.
    pub fn validate(&self) -> Result<()> {
        let label = self.route_label.as_str();
        if label.is_empty() {
            bail!("route_label must not be empty");
        }
        if let Some(bad) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            bail!("route_label '{label}' contains '{bad}'; use letters, digits, '-' or '_'");
        }
        if label.eq_ignore_ascii_case("health") {
            bail!("route_label '{label}' collides with the /health route");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
