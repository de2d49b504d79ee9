// =============================================================================
// kline-pulse — Main Entry Point
// =============================================================================
//
// Two long-running tasks share one `AppState`: the poller (fetch, enrich,
// persist) and the query API. Ctrl-C flips the shutdown channel; the poller
// finishes its current cycle and the server drains open requests.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod indicators;
mod market_data;
mod poller;
mod runtime_config;
mod snapshot;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::{BinanceClient, RateLimitTracker};
use crate::poller::Poller;
use crate::runtime_config::AppConfig;

const DEFAULT_CONFIG_PATH: &str = "kline_pulse.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("kline-pulse starting up");

    let config_path =
        std::env::var("KLINE_PULSE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "failed to load config, using defaults");
            let config = AppConfig::default();
            if let Err(e) = config.save(&config_path) {
                warn!(error = %format!("{e:#}"), "failed to write default config");
            }
            config
        }
    };
    config.apply_env(|key| std::env::var(key).ok());
    config.validate().context("invalid configuration")?;

    info!(
        symbol = %config.symbol,
        interval = %config.interval,
        route = %config.route_label,
        poll_secs = config.poll_interval_secs,
        "configuration resolved"
    );

    // ── 2. Shared state & upstream client ────────────────────────────────
    let rate_limit = Arc::new(RateLimitTracker::new(config.max_used_weight));
    let client = BinanceClient::new(
        config.base_url.clone(),
        config.request_timeout(),
        rate_limit.clone(),
    )?;
    let state = Arc::new(AppState::new(&config, rate_limit));
    info!(path = %state.snapshot_store.path().display(), "snapshot destination");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── 3. Poller ────────────────────────────────────────────────────────
    let poller = Poller::new(client, state.clone(), &config);
    let poller_handle = tokio::spawn(poller.run(shutdown_rx.clone()));

    // ── 4. Query API ─────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind query API on {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, route = %config.route_label, "query API listening");

    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(listener, api::router(state.clone())).with_graceful_shutdown(
        async move {
            // Either a `true` or a dropped sender ends the wait.
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        },
    );
    let server_handle = tokio::spawn(async move { server.await });

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    warn!("shutdown signal received, stopping gracefully");
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller_handle.await {
        error!(error = %e, "poller task panicked");
    }
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "query API failed"),
        Err(e) => error!(error = %e, "query API task panicked"),
    }

    info!(cycles = state.cycles(), "kline-pulse shut down complete");
    Ok(())
}
