// =============================================================================
// CoinMarketCap price-conversion client
// =============================================================================
//
// GET /v1/tools/price-conversion?amount=1&symbol=FROM&convert=TO
// authenticated with the X-CMC_PRO_API_KEY header. The key is never logged.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use super::rate_cache::RateProvider;

pub struct CoinMarketCapClient {
    base_url: String,
    client: reqwest::Client,
}

impl CoinMarketCapClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        if !api_key.is_empty() {
            let mut value =
                HeaderValue::from_str(api_key).context("API key is not a valid header value")?;
            value.set_sensitive(true);
            default_headers.insert("X-CMC_PRO_API_KEY", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for CoinMarketCap")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl RateProvider for CoinMarketCapClient {
    #[instrument(skip(self), name = "cmc::price_conversion")]
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64> {
        let url = format!("{}/v1/tools/price-conversion", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("amount", "1"), ("symbol", from), ("convert", to)])
            .send()
            .await
            .context("GET /v1/tools/price-conversion request failed")?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .context("failed to read price-conversion response")?;

        if !status.is_success() {
            anyhow::bail!("API Error: {text}");
        }

        let body: serde_json::Value =
            serde_json::from_str(&text).context("failed to parse price-conversion response")?;
        let rate = extract_price(&body, to)?;
        debug!(from, to, rate, "conversion rate retrieved");
        Ok(rate)
    }
}

/// Pull `data.quote[<to>].price` out of a price-conversion response.
///
/// Ambiguous symbols make the API return `data` as an array; the first
/// match is used.
fn extract_price(body: &serde_json::Value, to: &str) -> Result<f64> {
    let data = match &body["data"] {
        serde_json::Value::Array(items) => items.first().context("empty data array")?,
        other => other,
    };

    data["quote"][to]["price"]
        .as_f64()
        .with_context(|| format!("response has no price quote for {to}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_price_from_object() {
        let body = json!({
            "data": { "symbol": "BTC", "amount": 1, "quote": { "EUR": { "price": 60123.5 } } }
        });
        assert_eq!(extract_price(&body, "EUR").unwrap(), 60123.5);
    }

    #[test]
    fn extract_price_from_array_uses_first() {
        let body = json!({
            "data": [
                { "quote": { "USD": { "price": 1.5 } } },
                { "quote": { "USD": { "price": 9.0 } } }
            ]
        });
        assert_eq!(extract_price(&body, "USD").unwrap(), 1.5);
    }

    #[test]
    fn extract_price_missing_quote_is_error() {
        let body = json!({ "data": { "quote": { "USD": { "price": 1.0 } } } });
        assert!(extract_price(&body, "GBP").is_err());
        assert!(extract_price(&json!({ "data": [] }), "USD").is_err());
    }

    #[test]
    fn client_rejects_unprintable_key() {
        let result = CoinMarketCapClient::new(
            "https://example.test/",
            "bad\nkey",
            std::time::Duration::from_secs(1),
        );
        assert!(result.is_err());
    }
}
