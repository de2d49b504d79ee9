// =============================================================================
// Query API — Axum 0.7
// =============================================================================
//
// Read-only views over the latest snapshot. Every request reads the snapshot
// file afresh; nothing is cached between requests. Routes are mounted under
// the configured instrument label, e.g. `/BTC-USDT`.
//
// Series are JSON objects keyed by close time. Undefined values are `null`.
//
// CORS is configured permissively; the API serves public market data only.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api::QueryError;
use crate::app_state::{AppState, PollerHealth};
use crate::indicators::{EnrichedRow, EnrichedSnapshot};
use crate::snapshot::format_close_time;
use crate::types::IndicatorName;

/// Rows returned when `n` is not given.
pub const DEFAULT_TAIL: usize = 5;

// =============================================================================
// Router construction
// =============================================================================

/// Build the query router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let label = state.route_label.clone();

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(&format!("/{label}"), get(price))
        .route(&format!("/{label}/All_indicators"), get(all_indicators))
        .route(&format!("/{label}/indicator/:name"), get(indicator))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Query parameters
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct TailQuery {
    n: Option<String>,
}

impl TailQuery {
    /// Number of trailing rows requested; must be a positive integer.
    fn rows(&self) -> Result<usize, QueryError> {
        let Some(raw) = self.n.as_deref() else {
            return Ok(DEFAULT_TAIL);
        };
        match raw.trim().parse::<i64>() {
            Ok(n) if n > 0 => Ok(usize::try_from(n).unwrap_or(usize::MAX)),
            _ => Err(QueryError::InvalidN),
        }
    }
}

// =============================================================================
// Snapshot access
// =============================================================================

async fn load_snapshot(state: &AppState) -> Result<EnrichedSnapshot, QueryError> {
    let store = state.snapshot_store.clone();
    match tokio::task::spawn_blocking(move || store.read()).await {
        Ok(Ok(snapshot)) if snapshot.is_empty() => {
            warn!("snapshot has no rows yet");
            Err(QueryError::SnapshotUnavailable)
        }
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(e)) => {
            warn!(error = %format!("{e:#}"), "snapshot read failed");
            Err(QueryError::SnapshotUnavailable)
        }
        Err(e) => {
            warn!(error = %e, "snapshot reader task failed");
            Err(QueryError::SnapshotUnavailable)
        }
    }
}

fn number(v: f64) -> Value {
    if v.is_finite() {
        Value::from(v)
    } else {
        Value::Null
    }
}

/// `{close time: value}` for one column.
fn series(rows: &[EnrichedRow], pick: impl Fn(&EnrichedRow) -> f64) -> Value {
    let map: Map<String, Value> = rows
        .iter()
        .map(|r| (format_close_time(&r.close_time), number(pick(r))))
        .collect();
    Value::Object(map)
}

/// Payload fragment for one indicator group; composite groups nest their legs.
fn indicator_value(rows: &[EnrichedRow], name: IndicatorName) -> Value {
    match name {
        IndicatorName::Rsi => series(rows, |r| r.rsi),
        IndicatorName::Macd => serde_json::json!({
            "MACD": series(rows, |r| r.macd),
            "Signal": series(rows, |r| r.macd_signal),
            "MACD histogram": series(rows, |r| r.macd_histogram),
        }),
        IndicatorName::Stochastic => serde_json::json!({
            "Fast stochastic": series(rows, |r| r.fast_stochastic),
            "Slow Stochastic": series(rows, |r| r.slow_stochastic),
        }),
        IndicatorName::Ema => series(rows, |r| r.ema),
        IndicatorName::Sma => series(rows, |r| r.sma),
        IndicatorName::AdLine => series(rows, |r| r.ad_line),
        IndicatorName::Obv => series(rows, |r| r.obv),
        IndicatorName::Mfi => series(rows, |r| r.mfi),
        IndicatorName::Cmf => series(rows, |r| r.cmf),
        IndicatorName::Aroon => series(rows, |r| r.aroon),
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let base = state
        .route_label
        .split('-')
        .next()
        .unwrap_or(&state.route_label);
    let mut body = Map::new();
    body.insert(
        format!("To see latest {base} price"),
        Value::from(format!("go to \"/{}\"", state.route_label)),
    );
    Json(Value::Object(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    snapshot_rows: Option<usize>,
    last_close_time: Option<String>,
    poller: PollerHealth,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = load_snapshot(&state).await.ok();
    Json(HealthResponse {
        status: "ok",
        snapshot_rows: snapshot.as_ref().map(EnrichedSnapshot::len),
        last_close_time: snapshot
            .as_ref()
            .and_then(EnrichedSnapshot::last)
            .map(|r| format_close_time(&r.close_time)),
        poller: state.poller_health(),
    })
}

async fn price(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TailQuery>,
) -> Result<impl IntoResponse, QueryError> {
    let n = query.rows()?;
    let snapshot = load_snapshot(&state).await?;
    let rows = snapshot.tail(n);

    let mut body = Map::new();
    body.insert(
        format!("{} price", state.route_label),
        series(rows, |r| r.close),
    );
    Ok(Json(Value::Object(body)))
}

async fn all_indicators(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TailQuery>,
) -> Result<impl IntoResponse, QueryError> {
    let n = query.rows()?;
    let snapshot = load_snapshot(&state).await?;
    let rows = snapshot.tail(n);

    let mut body = Map::new();
    body.insert("Price".into(), series(rows, |r| r.close));
    for name in IndicatorName::ALL {
        body.insert(name.label().into(), indicator_value(rows, name));
    }
    Ok(Json(Value::Object(body)))
}

async fn indicator(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<TailQuery>,
) -> Result<impl IntoResponse, QueryError> {
    let n = query.rows()?;
    let name: IndicatorName = name
        .parse()
        .map_err(|_| QueryError::UnknownIndicator(name.clone()))?;
    let snapshot = load_snapshot(&state).await?;
    let rows = snapshot.tail(n);

    let mut body = Map::new();
    body.insert("Price".into(), series(rows, |r| r.close));
    body.insert(name.label().into(), indicator_value(rows, name));
    Ok(Json(Value::Object(body)))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::binance::RateLimitTracker;
    use crate::indicators::compute;
    use crate::indicators::tests::{constant_series, minute_series};
    use crate::runtime_config::AppConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn state_in(dir: &tempfile::TempDir) -> Arc<AppState> {
        let config = AppConfig {
            snapshot_path: dir.path().join("Kline.csv").display().to_string(),
            ..AppConfig::default()
        };
        Arc::new(AppState::new(&config, Arc::new(RateLimitTracker::new(1000))))
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let resp = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn index_points_at_instrument_route() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(state_in(&dir), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["To see latest BTC price"], "go to \"/BTC-USDT\"");
    }

    #[tokio::test]
    async fn non_positive_n_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&compute(&constant_series(10, 1.0)))
            .unwrap();

        for uri in [
            "/BTC-USDT?n=0",
            "/BTC-USDT?n=-1",
            "/BTC-USDT?n=abc",
            "/BTC-USDT/All_indicators?n=0",
            "/BTC-USDT/indicator/RSI?n=-3",
        ] {
            let (status, body) = get_json(state.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(
                body,
                serde_json::json!({ "query value error": "plz provide n>0" }),
                "{uri}"
            );
        }
    }

    #[tokio::test]
    async fn price_defaults_to_last_five_rows() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&compute(&minute_series(12, |i| 100.0 + i as f64)))
            .unwrap();

        let (status, body) = get_json(state, "/BTC-USDT").await;
        assert_eq!(status, StatusCode::OK);
        let prices = body["BTC-USDT price"].as_object().unwrap();
        assert_eq!(prices.len(), 5);
        assert_eq!(prices.values().last().unwrap(), 111.0);
    }

    #[tokio::test]
    async fn n_larger_than_table_returns_everything() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&compute(&constant_series(3, 7.0)))
            .unwrap();

        let (_, body) = get_json(state, "/BTC-USDT?n=500").await;
        assert_eq!(body["BTC-USDT price"].as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn macd_returns_three_aligned_series() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&compute(&minute_series(40, |i| 100.0 + (i as f64 * 0.3).sin())))
            .unwrap();

        let (status, body) = get_json(state, "/BTC-USDT/indicator/macd?n=7").await;
        assert_eq!(status, StatusCode::OK);

        let price_keys: Vec<&String> = body["Price"].as_object().unwrap().keys().collect();
        assert_eq!(price_keys.len(), 7);
        for leg in ["MACD", "Signal", "MACD histogram"] {
            let series = body["MACD"][leg].as_object().unwrap();
            let keys: Vec<&String> = series.keys().collect();
            assert_eq!(keys, price_keys, "{leg}");
            assert!(series.values().all(Value::is_number), "{leg}");
        }
    }

    #[tokio::test]
    async fn stochastic_nests_both_legs() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&compute(&minute_series(30, |i| 50.0 + (i % 5) as f64)))
            .unwrap();

        let (_, body) = get_json(state, "/BTC-USDT/indicator/Stochastic").await;
        assert!(body["Stochastic"]["Fast stochastic"].is_object());
        assert!(body["Stochastic"]["Slow Stochastic"].is_object());
    }

    #[tokio::test]
    async fn slash_in_indicator_name_is_percent_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&compute(&minute_series(10, |i| 10.0 + i as f64)))
            .unwrap();

        let (status, body) = get_json(state, "/BTC-USDT/indicator/A%2FD%20Line?n=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["A/D Line"].as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_indicator_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&compute(&constant_series(5, 1.0)))
            .unwrap();

        let (status, body) = get_json(state, "/BTC-USDT/indicator/VWAP").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let msg = body["query value error"].as_str().unwrap();
        assert!(msg.contains("VWAP"));
    }

    #[tokio::test]
    async fn constant_prices_serve_nulls_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&compute(&constant_series(30, 10.0)))
            .unwrap();

        let (status, body) = get_json(state, "/BTC-USDT/All_indicators").await;
        assert_eq!(status, StatusCode::OK);

        let rsi = body["RSI"].as_object().unwrap();
        assert_eq!(rsi.len(), 5);
        assert!(rsi.values().all(Value::is_null));
        assert!(body["Stochastic"]["Fast stochastic"]
            .as_object()
            .unwrap()
            .values()
            .all(Value::is_null));
        assert!(body["SMA"].as_object().unwrap().values().all(|v| v == 10.0));
        for key in [
            "Price", "RSI", "MACD", "Stochastic", "EMA", "SMA", "A/D Line", "OBV", "CMF", "MFI",
            "Aroon",
        ] {
            assert!(body.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn validated_label_mounts_instrument_routes() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            route_label: "ETH_USDT".into(),
            snapshot_path: dir.path().join("Kline.csv").display().to_string(),
            ..AppConfig::default()
        };
        config.validate().unwrap();
        let state = Arc::new(AppState::new(&config, Arc::new(RateLimitTracker::new(1000))));
        state
            .snapshot_store
            .write(&compute(&constant_series(3, 4.0)))
            .unwrap();

        let (status, body) = get_json(state.clone(), "/ETH_USDT?n=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ETH_USDT price"].as_object().unwrap().len(), 1);

        let (status, _) = get_json(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn header_only_snapshot_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state
            .snapshot_store
            .write(&EnrichedSnapshot::default())
            .unwrap();

        let (status, _) = get_json(state, "/BTC-USDT").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn missing_snapshot_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(state_in(&dir), "/BTC-USDT/All_indicators").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, serde_json::json!({ "error": "snapshot not available" }));
    }

    #[tokio::test]
    async fn health_reports_snapshot_and_poller() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);

        let (status, body) = get_json(state.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["snapshot_rows"].is_null());

        state
            .snapshot_store
            .write(&compute(&constant_series(4, 2.0)))
            .unwrap();
        state.record_success(4);

        let (_, body) = get_json(state, "/health").await;
        assert_eq!(body["snapshot_rows"], 4);
        assert_eq!(body["poller"]["cycles"], 1);
        assert!(body["last_close_time"].is_string());
    }
}
