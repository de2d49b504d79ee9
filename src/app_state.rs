// =============================================================================
// Central Application State — kline-pulse
// =============================================================================
//
// Shared between the poller (single writer of the snapshot and of the poll
// status) and the query handlers (readers). The snapshot itself lives on disk;
// what is held here is where to find it plus bookkeeping for `/health`.
//
// Thread safety:
//   - Atomic counter for completed cycles.
//   - parking_lot::RwLock for the poll status record.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::binance::rate_limit::{RateLimitSnapshot, RateLimitTracker};
use crate::runtime_config::AppConfig;
use crate::snapshot::SnapshotStore;
use crate::types::Interval;

// =============================================================================
// Error Record
// =============================================================================

/// Most recent poll failure, for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Outcome bookkeeping of the polling loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStatus {
    pub last_success: Option<DateTime<Utc>>,
    pub last_rows_written: usize,
    pub last_error: Option<ErrorRecord>,
}

/// Serialisable view of the poller for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct PollerHealth {
    pub symbol: String,
    pub interval: Interval,
    pub cycles: u64,
    pub uptime_secs: u64,
    #[serde(flatten)]
    pub status: PollStatus,
    pub rate_limit: RateLimitSnapshot,
}

// =============================================================================
// AppState
// =============================================================================

/// State shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    pub symbol: String,
    pub interval: Interval,
    /// Path segment the query API answers under.
    pub route_label: String,
    pub snapshot_store: SnapshotStore,
    pub rate_limit: Arc<RateLimitTracker>,

    cycles: AtomicU64,
    poll_status: RwLock<PollStatus>,
    start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: &AppConfig, rate_limit: Arc<RateLimitTracker>) -> Self {
        Self {
            symbol: config.symbol.clone(),
            interval: config.interval,
            route_label: config.route_label.clone(),
            snapshot_store: SnapshotStore::new(&config.snapshot_path),
            rate_limit,
            cycles: AtomicU64::new(0),
            poll_status: RwLock::new(PollStatus::default()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Record a cycle that ended with the snapshot written.
    pub fn record_success(&self, rows: usize) {
        let mut status = self.poll_status.write();
        status.last_success = Some(Utc::now());
        status.last_rows_written = rows;
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cycle that ended without a new snapshot.
    pub fn record_failure(&self, message: String) {
        let mut status = self.poll_status.write();
        status.last_error = Some(ErrorRecord {
            message,
            at: Utc::now().to_rfc3339(),
        });
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn poller_health(&self) -> PollerHealth {
        PollerHealth {
            symbol: self.symbol.clone(),
            interval: self.interval,
            cycles: self.cycles(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            status: self.poll_status.read().clone(),
            rate_limit: self.rate_limit.snapshot(),
        }
    }
}
