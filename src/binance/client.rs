// =============================================================================
// Binance REST API Client — public historical klines
// =============================================================================
//
// Only unauthenticated market-data endpoints are used, so no API key or
// request signing is involved. Binance caps a single klines call at 1000 rows.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::types::{CandlePoint, KlineQuery};

/// Hard per-call row cap enforced by Binance.
pub const MAX_KLINES_LIMIT: u32 = 1000;

/// Source of historical OHLC bars.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn klines(&self, query: &KlineQuery) -> Result<Vec<CandlePoint>>;
}

/// Binance REST client for public market data.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    limit: u32,
    client: reqwest::Client,
}

impl BinanceClient {
    /// Create a new `BinanceClient`.
    ///
    /// # Arguments
    /// * `base_url` — REST root, normally `https://api.binance.com`.
    /// * `limit`    — rows per klines call, clamped to [`MAX_KLINES_LIMIT`].
    /// * `timeout`  — per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        limit: u32,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for Binance")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            limit: limit.clamp(1, MAX_KLINES_LIMIT),
            client,
        })
    }

    fn query_params(&self, query: &KlineQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", query.symbol.clone()),
            ("interval", query.interval.clone()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(start) = query.start_ms {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = query.end_ms {
            params.push(("endTime", end.to_string()));
        }
        params
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    /// GET /api/v3/klines (public — no signature required).
    #[instrument(skip(self), name = "binance::get_klines")]
    async fn klines(&self, query: &KlineQuery) -> Result<Vec<CandlePoint>> {
        let url = format!("{}/api/v3/klines", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&self.query_params(query))
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/klines returned {}: {}", status, body);
        }

        let candles = parse_klines(&body)?;
        debug!(
            symbol = %query.symbol,
            interval = %query.interval,
            count = candles.len(),
            "klines fetched"
        );
        Ok(candles)
    }
}

/// Reshape Binance's array-of-arrays klines response.
///
/// Array indices used:
///   [0] openTime (ms), [1] open, [2] high, [3] low, [4] close
fn parse_klines(body: &serde_json::Value) -> Result<Vec<CandlePoint>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 5 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time = arr[0].as_i64().context("kline open time is not an integer")?;
        candles.push(CandlePoint {
            time: open_time / 1000,
            open: parse_str_f64(&arr[1])?,
            high: parse_str_f64(&arr[2])?,
            low: parse_str_f64(&arr[3])?,
            close: parse_str_f64(&arr[4])?,
        });
    }
    Ok(candles)
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("limit", &self.limit)
            .finish()
    }
}
