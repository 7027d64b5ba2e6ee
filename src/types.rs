// =============================================================================
// Shared types used across the ticker dashboard
// =============================================================================

use serde::{Deserialize, Serialize};

/// Latest 24h ticker observation for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Upper-case exchange symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Last traded price.
    pub price: f64,
    /// Rolling 24h base-asset volume.
    pub volume: f64,
    /// Rolling 24h price change in percent.
    pub percent_change: f64,
}

/// Payload pushed to dashboard clients for every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub change: f64,
}

impl From<&Tick> for PriceUpdate {
    fn from(tick: &Tick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            price: tick.price,
            volume: tick.volume,
            change: tick.percent_change,
        }
    }
}

/// Named event wrapper for everything sent over the push channel.
#[derive(Debug, Clone, Serialize)]
pub struct PushEvent<'a, T: Serialize> {
    pub event: &'a str,
    pub data: T,
}

/// Event name used for price updates on the push channel.
pub const PRICE_UPDATE_EVENT: &str = "price_update";

/// One OHLC bar as consumed by the chart page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlePoint {
    /// Bar open time in unix seconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Parameters for a historical klines request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineQuery {
    /// Upper-case exchange symbol.
    pub symbol: String,
    pub interval: String,
    /// Start of the range in unix milliseconds.
    pub start_ms: Option<i64>,
    /// End of the range in unix milliseconds.
    pub end_ms: Option<i64>,
}

/// Kline intervals accepted by the Binance REST API.
pub const KLINE_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d",
    "1w", "1M",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_update_maps_percent_change_to_change() {
        let tick = Tick {
            symbol: "BTCUSDT".into(),
            price: 65000.5,
            volume: 1200.0,
            percent_change: -1.25,
        };
        let update = PriceUpdate::from(&tick);
        assert_eq!(update.symbol, "BTCUSDT");
        assert!((update.change + 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn push_event_serialises_with_event_name() {
        let update = PriceUpdate {
            symbol: "ETHUSDT".into(),
            price: 3000.0,
            volume: 10.0,
            change: 2.0,
        };
        let json = serde_json::to_value(PushEvent {
            event: PRICE_UPDATE_EVENT,
            data: &update,
        })
        .unwrap();
        assert_eq!(json["event"], "price_update");
        assert_eq!(json["data"]["symbol"], "ETHUSDT");
        assert_eq!(json["data"]["change"], 2.0);
    }
}
