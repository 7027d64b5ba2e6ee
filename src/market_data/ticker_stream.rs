// =============================================================================
// Ticker Feed Client — Binance 24h ticker WebSocket consumer
// =============================================================================
//
// One outbound connection to the combined `/ws` endpoint. After connecting we
// send a SUBSCRIBE command naming `<symbol>@ticker` for every allow-listed
// symbol, then consume frames until the stream ends.
//
// Parsing is split from delivery: `ticks()` lazily adapts the raw message
// stream into parsed ticks (malformed frames are logged and dropped) and the
// consumer loop hands each tick to the Tick Store and the Broadcast Relay.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{future, SinkExt, Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::market_data::TickStore;
use crate::relay::BroadcastHub;
use crate::types::Tick;

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TickerMessage {
    Tick(Tick),
    /// Reply to our SUBSCRIBE command, e.g. `{"result":null,"id":1}`.
    Ack { id: Option<u64> },
}

/// Build the SUBSCRIBE command for `symbols`.
pub fn subscription_message(symbols: &[String]) -> String {
    let params: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@ticker", s.to_lowercase()))
        .collect();
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": params,
        "id": 1,
    })
    .to_string()
}

/// Parse a single ticker frame.
///
/// Expected shape (fields we use):
/// ```json
/// { "e": "24hrTicker", "s": "BTCUSDT", "c": "65000.10", "v": "1234.5", "P": "-1.25" }
/// ```
pub fn parse_ticker(text: &str) -> Result<TickerMessage> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse ticker JSON")?;

    if root.get("result").is_some() && root.get("id").is_some() {
        return Ok(TickerMessage::Ack {
            id: root["id"].as_u64(),
        });
    }

    if let Some(event) = root.get("e").and_then(|v| v.as_str()) {
        if event != "24hrTicker" {
            anyhow::bail!("unexpected event type {event}");
        }
    }

    let symbol = root["s"]
        .as_str()
        .context("missing field s")?
        .to_uppercase();

    Ok(TickerMessage::Tick(Tick {
        symbol,
        price: parse_string_f64(&root["c"], "c")?,
        volume: parse_string_f64(&root["v"], "v")?,
        percent_change: parse_string_f64(&root["P"], "P")?,
    }))
}

fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    let parsed = match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("field {name}: '{s}' is not a number"))?,
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name}: number out of range"))?,
        serde_json::Value::Null => anyhow::bail!("missing field {name}"),
        other => anyhow::bail!("field {name}: expected string or number, got {other}"),
    };
    if !parsed.is_finite() {
        anyhow::bail!("field {name}: non-finite value");
    }
    Ok(parsed)
}

/// Adapt a WebSocket message stream into a stream of parsed ticks.
///
/// Malformed text frames and subscription acks are dropped, control and
/// binary frames are ignored, transport errors are passed through.
pub fn ticks<S, E>(messages: S) -> impl Stream<Item = Result<Tick, E>>
where
    S: Stream<Item = Result<Message, E>>,
{
    messages.filter_map(|msg| {
        future::ready(match msg {
            Ok(Message::Text(text)) => match parse_ticker(&text) {
                Ok(TickerMessage::Tick(tick)) => Some(Ok(tick)),
                Ok(TickerMessage::Ack { id }) => {
                    debug!(id = ?id, "ticker subscription acknowledged");
                    None
                }
                Err(e) => {
                    warn!(error = %e, message = %text, "dropping malformed ticker message");
                    None
                }
            },
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    })
}

/// Hand one tick to the store and every connected client.
pub fn deliver(tick: Tick, store: &TickStore, hub: &BroadcastHub) {
    record_then_publish(tick, store, |tick| {
        hub.publish(tick);
    });
}

/// The store is written before the tick is published, so a client that
/// subscribes and then snapshots can never end up with an older price than
/// the store holds.
fn record_then_publish(tick: Tick, store: &TickStore, publish: impl FnOnce(&Tick)) {
    store.apply(tick.clone());
    publish(&tick);
}

/// Connect to the ticker feed at `url`, subscribe to `symbols` and deliver
/// ticks until the stream ends.
///
/// Returns `Ok(())` when the server closes the stream and an error when the
/// connection cannot be established or breaks.
pub async fn run_ticker_stream(
    url: &str,
    symbols: &[String],
    store: &TickStore,
    hub: &BroadcastHub,
) -> Result<()> {
    info!(url = %url, symbols = ?symbols, "connecting to ticker WebSocket");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to ticker WebSocket")?;

    let (mut write, read) = ws_stream.split();
    write
        .send(Message::Text(subscription_message(symbols)))
        .await
        .context("failed to send ticker subscription")?;
    info!(count = symbols.len(), "ticker WebSocket connected and subscribed");

    let mut stream = std::pin::pin!(ticks(read));
    while let Some(item) = stream.next().await {
        match item {
            Ok(tick) => deliver(tick, store, hub),
            Err(e) => {
                error!(error = %e, "ticker WebSocket read error");
                return Err(e.into());
            }
        }
    }

    warn!("ticker WebSocket stream ended");
    Ok(())
}

/// Run the feed for the lifetime of the process.
///
/// After each disconnect the feed waits `feed_reconnect_secs` and connects
/// again; a delay of zero stops after the first disconnect.
pub async fn supervise(state: Arc<AppState>) {
    let url = state.config.feed_url.clone();
    let symbols = state.config.symbols.clone();
    let delay = Duration::from_secs(state.config.feed_reconnect_secs);

    loop {
        match run_ticker_stream(&url, &symbols, &state.ticks, &state.hub).await {
            Ok(()) => info!("ticker feed closed"),
            Err(e) => error!(error = %e, "ticker feed failed"),
        }

        if delay.is_zero() {
            warn!("ticker feed reconnection disabled — feed task exiting");
            return;
        }
        info!(delay_secs = delay.as_secs(), "reconnecting ticker feed");
        tokio::time::sleep(delay).await;
    }
}
