// =============================================================================
// Rate-Limit Tracker — monitors Binance request weight to avoid 429s
// =============================================================================
//
// Binance caps request weight per IP at 6000 per minute on spot; a klines call
// with the default limit costs 2. The tracker reads `X-MBX-USED-WEIGHT-1M`
// after every response and lets the poller skip a cycle before the venue
// starts rejecting (429) or banning (418).
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

/// Request weight of one `/api/v3/klines` call at the default limit.
pub const KLINES_WEIGHT: u32 = 2;

/// Thread-safe tracker backed by an atomic counter.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    ceiling: u32,
}

/// Serialisable view of the tracker for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub ceiling: u32,
}

impl RateLimitTracker {
    /// Create a tracker that refuses requests once the reported weight would
    /// pass `ceiling`.
    pub fn new(ceiling: u32) -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            ceiling,
        }
    }

    /// Record the weight reported by the venue in `headers`.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(weight) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u32>().ok())
        else {
            return;
        };

        let prev = self.used_weight_1m.swap(weight, Ordering::Relaxed);
        let warn_at = self.ceiling / 5 * 4;
        if weight >= warn_at && prev < warn_at {
            warn!(
                used_weight = weight,
                ceiling = self.ceiling,
                "rate-limit weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = weight, "rate-limit weight updated from header");
    }

    /// True if another request of `weight` stays within the ceiling.
    pub fn has_headroom(&self, weight: u32) -> bool {
        let current = self.used_weight_1m.load(Ordering::Relaxed);
        current.saturating_add(weight) <= self.ceiling
    }

    /// Forget the last reported weight. The venue's window is one minute, so
    /// the poller calls this after sitting out a cycle.
    pub fn reset(&self) {
        self.used_weight_1m.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.used_weight_1m.load(Ordering::Relaxed),
            ceiling: self.ceiling,
        }
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight_1m.load(Ordering::Relaxed))
            .field("ceiling", &self.ceiling)
            .finish()
    }
}
