// =============================================================================
// Poller — fetch, enrich, persist, sleep
// =============================================================================
//
// One sequential task. Each cycle:
//
//   1. Sit the cycle out if the last reported request weight leaves no room.
//   2. Fetch the bar window, retrying transport failures and 5xx answers with
//      capped exponential backoff.
//   3. Fold the window into the incremental engine.
//   4. Replace the snapshot file.
//
// A failed cycle is logged and skipped; the loop only ends on shutdown. Every
// sleep races the shutdown channel, and a cycle that already started its write
// finishes it before the loop exits.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::binance::rate_limit::KLINES_WEIGHT;
use crate::binance::{BinanceClient, FetchError};
use crate::indicators::incremental::IncrementalEngine;
use crate::market_data::BarSeries;
use crate::runtime_config::{AppConfig, RetryPolicy};

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Snapshot replaced with `rows` rows.
    Written { rows: usize },
    /// Skipped because of request-weight pressure.
    Throttled,
    /// The venue answered with no bars; the previous snapshot was kept.
    Empty,
    FetchFailed,
    WriteFailed,
}

pub struct Poller {
    client: BinanceClient,
    state: Arc<AppState>,
    engine: IncrementalEngine,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl Poller {
    pub fn new(client: BinanceClient, state: Arc<AppState>, config: &AppConfig) -> Self {
        Self {
            client,
            state,
            engine: IncrementalEngine::new(config.history_capacity),
            retry: config.retry.clone(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Run cycles until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            symbol = %self.state.symbol,
            interval = %self.state.interval,
            poll_secs = self.poll_interval.as_secs(),
            "poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.run_cycle(&mut shutdown).await;
            debug!(?outcome, cycles = self.state.cycles(), "poll cycle finished");

            if sleep_or_shutdown(self.poll_interval, &mut shutdown).await {
                break;
            }
        }

        info!("poller stopped");
    }

    /// Execute one fetch/enrich/persist cycle.
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
        let rate_limit = self.client.rate_limit();
        if !rate_limit.has_headroom(KLINES_WEIGHT) {
            warn!(
                used_weight_1m = rate_limit.snapshot().used_weight_1m,
                "request weight at ceiling, skipping cycle"
            );
            // The venue's weight window is one minute; the next cycle will
            // learn the real figure from its response headers.
            rate_limit.reset();
            self.state.record_failure("skipped: request weight at ceiling".into());
            return CycleOutcome::Throttled;
        }

        let series = match self.fetch_with_retry(shutdown).await {
            Ok(series) => series,
            Err(e) => {
                warn!(error = %e, "fetch failed, skipping cycle");
                self.state.record_failure(e.to_string());
                return CycleOutcome::FetchFailed;
            }
        };

        if series.is_empty() {
            warn!("venue returned no bars, keeping previous snapshot");
            self.state.record_failure("venue returned no bars".into());
            return CycleOutcome::Empty;
        }

        let update = self.engine.update(&series);
        let snapshot = self.engine.snapshot();
        let rows = snapshot.len();

        let store = self.state.snapshot_store.clone();
        let written = tokio::task::spawn_blocking(move || store.write(&snapshot)).await;
        match written {
            Ok(Ok(())) => {
                info!(?update, rows, "snapshot updated");
                self.state.record_success(rows);
                CycleOutcome::Written { rows }
            }
            Ok(Err(e)) => {
                error!(error = %e, "failed to write snapshot");
                self.state.record_failure(format!("snapshot write failed: {e:#}"));
                CycleOutcome::WriteFailed
            }
            Err(e) => {
                error!(error = %e, "snapshot writer task failed");
                self.state.record_failure(format!("snapshot writer task failed: {e}"));
                CycleOutcome::WriteFailed
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<BarSeries, FetchError> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            match self
                .client
                .fetch_bars(&self.state.symbol, self.state.interval)
                .await
            {
                Ok(series) => return Ok(series),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    if sleep_or_shutdown(delay, shutdown).await {
                        return Err(e);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Sleep for `duration` unless shutdown is signalled first.
///
/// Returns `true` when the caller should stop.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
