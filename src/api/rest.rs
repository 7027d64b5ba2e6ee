// =============================================================================
// HTTP Router and JSON Endpoints — Axum 0.7
// =============================================================================
//
// Public: `/health`, `/login`, `/register`, `/logout`.
// Session-gated pages redirect to `/login`; session-gated JSON endpoints and
// the push socket answer 401.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::api::{auth::ApiUser, pages, ws};
use crate::app_state::AppState;
use crate::error::AppError;
use crate::types::{KlineQuery, KLINE_INTERVALS};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full router with request tracing and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/health", get(health))
        .route("/login", get(pages::login_form).post(pages::login))
        .route("/register", get(pages::register_form).post(pages::register))
        .route("/logout", get(pages::logout))
        // ── Pages (session) ─────────────────────────────────────────
        .route("/", get(pages::index))
        .route("/candlestick/:symbol", get(pages::candlestick))
        // ── JSON (session) ──────────────────────────────────────────
        .route("/convert", get(convert))
        .route("/get-candlestick-data", get(candlestick_data))
        .route("/api/prices", get(prices))
        // ── Push channel (session) ──────────────────────────────────
        .route("/ws", get(ws::ws_handler))
        // ── Middleware & State ──────────────────────────────────────
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health())
}

// =============================================================================
// Latest prices
// =============================================================================

async fn prices(_user: ApiUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.ticks.snapshot())
}

// =============================================================================
// Currency conversion
// =============================================================================

#[derive(Deserialize)]
struct ConvertQuery {
    amount: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

async fn convert(
    _user: ApiUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConvertQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let amount = parse_amount(query.amount.as_deref())?;
    let from = currency_code(query.from.as_deref(), "from")?;
    let to = currency_code(query.to.as_deref(), "to")?;

    if from == to {
        return Ok(Json(json!({ "converted": amount })));
    }

    let rate = state.rates.lookup(&from, &to).await?;
    debug!(from = %from, to = %to, amount, rate, "converted amount");
    Ok(Json(json!({ "converted": amount * rate })))
}

fn parse_amount(raw: Option<&str>) -> Result<f64, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("amount is required".into()))?;

    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(AppError::BadRequest(format!("invalid amount: '{raw}'"))),
    }
}

/// Upper-cased currency code, `USD` when absent.
fn currency_code(raw: Option<&str>, field: &str) -> Result<String, AppError> {
    let code = raw.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("USD");
    let valid = (2..=10).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid {
        return Err(AppError::BadRequest(format!(
            "invalid currency code for {field}: '{code}'"
        )));
    }
    Ok(code.to_ascii_uppercase())
}

// =============================================================================
// Candlestick data
// =============================================================================

#[derive(Deserialize)]
struct CandleQuery {
    symbol: Option<String>,
    interval: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

async fn candlestick_data(
    _user: ApiUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandleQuery>,
) -> Result<impl IntoResponse, AppError> {
    let symbol = query.symbol.unwrap_or_default().trim().to_uppercase();
    if !state.config.is_allowed(&symbol) {
        return Err(AppError::InvalidSymbol);
    }

    let interval = query
        .interval
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| state.config.default_interval.clone());
    if !KLINE_INTERVALS.contains(&interval.as_str()) {
        return Err(AppError::BadRequest(format!("invalid interval: '{interval}'")));
    }

    let start_ms = parse_date_ms(query.start.as_deref(), "start")?;
    let end_ms = parse_date_ms(query.end.as_deref(), "end")?;
    if let (Some(start), Some(end)) = (start_ms, end_ms) {
        if start > end {
            return Err(AppError::BadRequest("start must not be after end".into()));
        }
    }

    let kline_query = KlineQuery {
        symbol,
        interval,
        start_ms,
        end_ms,
    };
    let candles = state
        .candles
        .klines(&kline_query)
        .await
        .map_err(|e| AppError::Upstream(format!("{e:#}")))?;

    Ok(Json(candles))
}

/// `YYYY-MM-DD` as unix milliseconds at UTC midnight. Empty means absent.
fn parse_date_ms(raw: Option<&str>, field: &str) -> Result<Option<i64>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(format!("invalid {field} date '{raw}', expected YYYY-MM-DD"))
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::BadRequest(format!("invalid {field} date '{raw}'")))?;
    Ok(Some(Utc.from_utc_datetime(&midnight).timestamp_millis()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    use crate::app_state::test_support::{state_with, FakeCandles};
    use crate::conversion::rate_cache::tests::CountingProvider;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn get(state: &Arc<AppState>, uri: &str, session: Option<&str>) -> Response {
        let mut req = Request::builder().uri(uri);
        if let Some(id) = session {
            req = req.header(header::COOKIE, format!("session_id={id}"));
        }
        router(state.clone())
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_form(state: &Arc<AppState>, uri: &str, form: &str) -> Response {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        router(state.clone()).oneshot(req).await.unwrap()
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    #[test]
    fn parse_amount_cases() {
        assert_eq!(parse_amount(Some(" 2.5 ")).unwrap(), 2.5);
        assert!(parse_amount(None).is_err());
        assert!(parse_amount(Some("")).is_err());
        assert!(parse_amount(Some("ten")).is_err());
        assert!(parse_amount(Some("inf")).is_err());
    }

    #[test]
    fn currency_code_defaults_and_validates() {
        assert_eq!(currency_code(None, "from").unwrap(), "USD");
        assert_eq!(currency_code(Some("eur"), "to").unwrap(), "EUR");
        assert!(currency_code(Some("E"), "to").is_err());
        assert!(currency_code(Some("US D"), "to").is_err());
        assert!(currency_code(Some("USD;DROP"), "to").is_err());
    }

    #[test]
    fn parse_date_is_utc_midnight() {
        assert_eq!(
            parse_date_ms(Some("2024-01-01"), "start").unwrap(),
            Some(1_704_067_200_000)
        );
        assert_eq!(parse_date_ms(Some(""), "start").unwrap(), None);
        assert_eq!(parse_date_ms(None, "start").unwrap(), None);
        assert!(parse_date_ms(Some("01/02/2024"), "start").is_err());
    }

    // ── Public endpoints ────────────────────────────────────────────────

    #[tokio::test]
    async fn health_is_public() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;
        let resp = get(&state, "/health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    // ── Session gating ──────────────────────────────────────────────────

    #[tokio::test]
    async fn pages_redirect_without_session() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;
        for uri in ["/", "/candlestick/btcusdt"] {
            let resp = get(&state, uri, None).await;
            assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(resp.headers()[header::LOCATION], "/login");
        }
    }

    #[tokio::test]
    async fn json_endpoints_require_session() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;
        for uri in [
            "/convert?amount=1&from=BTC&to=USD",
            "/get-candlestick-data?symbol=BTCUSDT",
            "/api/prices",
            "/ws",
        ] {
            let resp = get(&state, uri, Some("forged")).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    // ── Conversion ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn convert_same_currency_is_identity_without_lookup() {
        let provider = CountingProvider::failing();
        let state = state_with(provider.clone(), FakeCandles::new(false)).await;
        let sid = state.sessions.create("alice");

        let resp = get(&state, "/convert?amount=12.5&from=btc&to=BTC", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["converted"], 12.5);

        let resp = get(&state, "/convert?amount=3", Some(&sid)).await;
        assert_eq!(body_json(resp).await["converted"], 3.0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn convert_multiplies_by_cached_rate() {
        let provider = CountingProvider::new(0.5);
        let state = state_with(provider.clone(), FakeCandles::new(false)).await;
        let sid = state.sessions.create("alice");

        for _ in 0..2 {
            let resp = get(&state, "/convert?amount=4&from=USD&to=EUR", Some(&sid)).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(body_json(resp).await["converted"], 2.0);
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn convert_rejects_bad_input() {
        let provider = CountingProvider::new(0.5);
        let state = state_with(provider.clone(), FakeCandles::new(false)).await;
        let sid = state.sessions.create("alice");

        for uri in [
            "/convert?from=USD&to=EUR",
            "/convert?amount=abc&to=EUR",
            "/convert?amount=1&to=%24%24",
        ] {
            let resp = get(&state, uri, Some(&sid)).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert!(body_json(resp).await["error"].is_string());
        }
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn convert_surfaces_upstream_failure() {
        let state = state_with(CountingProvider::failing(), FakeCandles::new(false)).await;
        let sid = state.sessions.create("alice");

        let resp = get(&state, "/convert?amount=1&from=USD&to=XXX", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("API Error"));
    }

    // ── Candlesticks ────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_symbols_never_reach_upstream() {
        let candles = FakeCandles::new(false);
        let state = state_with(CountingProvider::new(1.0), candles.clone()).await;
        let sid = state.sessions.create("alice");

        let resp = get(&state, "/get-candlestick-data?symbol=ADAUSDT", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Invalid coin symbol");

        let resp = get(&state, "/get-candlestick-data", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = get(&state, "/candlestick/adausdt", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(resp).await, "Invalid coin symbol");

        assert_eq!(candles.calls(), 0);
    }

    #[tokio::test]
    async fn candlestick_data_proxies_with_range() {
        let candles = FakeCandles::new(false);
        let state = state_with(CountingProvider::new(1.0), candles.clone()).await;
        let sid = state.sessions.create("alice");

        let resp = get(
            &state,
            "/get-candlestick-data?symbol=btcusdt&interval=4h&start=2024-01-01&end=2024-01-02",
            Some(&sid),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body[0]["time"], 1_700_000_000);
        assert_eq!(body[0]["close"], 1.5);

        let query = candles.last_query.lock().clone().unwrap();
        assert_eq!(query.symbol, "BTCUSDT");
        assert_eq!(query.interval, "4h");
        assert_eq!(query.start_ms, Some(1_704_067_200_000));
        assert_eq!(query.end_ms, Some(1_704_153_600_000));
    }

    #[tokio::test]
    async fn candlestick_data_defaults_interval() {
        let candles = FakeCandles::new(false);
        let state = state_with(CountingProvider::new(1.0), candles.clone()).await;
        let sid = state.sessions.create("alice");

        let resp = get(&state, "/get-candlestick-data?symbol=ETHUSDT", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let query = candles.last_query.lock().clone().unwrap();
        assert_eq!(query.interval, "1h");
        assert_eq!(query.start_ms, None);
    }

    #[tokio::test]
    async fn candlestick_data_rejects_bad_parameters() {
        let candles = FakeCandles::new(false);
        let state = state_with(CountingProvider::new(1.0), candles.clone()).await;
        let sid = state.sessions.create("alice");

        for uri in [
            "/get-candlestick-data?symbol=BTCUSDT&interval=7m",
            "/get-candlestick-data?symbol=BTCUSDT&start=yesterday",
            "/get-candlestick-data?symbol=BTCUSDT&start=2024-02-01&end=2024-01-01",
        ] {
            let resp = get(&state, uri, Some(&sid)).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(candles.calls(), 0);
    }

    #[tokio::test]
    async fn candlestick_upstream_failure_is_server_error() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(true)).await;
        let sid = state.sessions.create("alice");

        let resp = get(&state, "/get-candlestick-data?symbol=BTCUSDT", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to fetch candlestick data"));
    }

    #[tokio::test]
    async fn candlestick_page_renders_for_allowed_symbol() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;
        let sid = state.sessions.create("alice");

        let resp = get(&state, "/candlestick/solusdt", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("<h1>SOLUSDT</h1>"));
    }

    // ── Dashboard & prices ──────────────────────────────────────────────

    #[tokio::test]
    async fn dashboard_lists_symbols_and_latest_prices() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;
        state.ticks.apply(crate::types::Tick {
            symbol: "BTCUSDT".into(),
            price: 65000.0,
            volume: 10.0,
            percent_change: 1.5,
        });
        let sid = state.sessions.create("alice");

        let resp = get(&state, "/", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let page = body_text(resp).await;
        assert!(page.contains("row-DOGEUSDT"));
        assert!(page.contains("65000.000000"));
        assert!(page.contains("<strong>alice</strong>"));

        let resp = get(&state, "/api/prices", Some(&sid)).await;
        let body = body_json(resp).await;
        assert_eq!(body[0]["symbol"], "BTCUSDT");
        assert_eq!(body[0]["percent_change"], 1.5);
    }

    // ── Accounts ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn register_login_logout_flow() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;

        let resp = post_form(&state, "/register", "username=alice&password=wonderland").await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/login");

        let resp = post_form(&state, "/login", "username=alice&password=wonderland").await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        let sid = cookie
            .strip_prefix("session_id=")
            .and_then(|rest| rest.split(';').next())
            .unwrap()
            .to_string();
        assert_eq!(state.sessions.resolve(&sid).unwrap().username, "alice");

        let resp = get(&state, "/logout", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(state.sessions.resolve(&sid).is_none());

        let resp = get(&state, "/", Some(&sid)).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn wrong_password_never_creates_session() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;
        state.users.register("alice", "wonderland").await.unwrap();

        let resp = post_form(&state, "/login", "username=alice&password=nope").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
        assert!(body_text(resp).await.contains("Invalid username or password"));
        assert_eq!(state.sessions.len(), 0);
    }

    #[tokio::test]
    async fn duplicate_registration_shows_inline_error() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;
        post_form(&state, "/register", "username=alice&password=first").await;

        let resp = post_form(&state, "/register", "username=alice&password=second").await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(body_text(resp).await.contains("Username already exists"));

        assert!(state.users.verify("alice", "first").await.unwrap());
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected_inline() {
        let state = state_with(CountingProvider::new(1.0), FakeCandles::new(false)).await;

        let resp = post_form(&state, "/register", "username=&password=x").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = post_form(&state, "/login", "username=bob").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.sessions.len(), 0);
    }
}
