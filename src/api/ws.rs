// =============================================================================
// WebSocket Handler — live price push channel
// =============================================================================
//
// Logged-in browsers connect to `/ws` and receive:
//   1. One `price_update` event per symbol already in the Tick Store.
//   2. A `price_update` event for every tick relayed afterwards.
//
// Each connection owns one relay Subscription for its lifetime; it is dropped
// (unsubscribed) when the client goes away or a send fails.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::auth::ApiUser;
use crate::app_state::AppState;
use crate::types::{PriceUpdate, PushEvent, PRICE_UPDATE_EVENT};

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ApiUser(username): ApiUser,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    info!(username = %username, "push channel accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, username))
}

/// Manages a single push connection.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>, username: String) {
    // Subscribe before sending the snapshot so no tick falls in between.
    let mut subscription = state.hub.subscribe();
    let (mut sender, mut receiver) = socket.split();

    for tick in state.ticks.snapshot() {
        if let Err(e) = send_event(&mut sender, &PriceUpdate::from(&tick)).await {
            debug!(error = %e, "failed to send initial snapshot — disconnecting");
            return;
        }
    }

    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(update) = update else {
                    info!("relay closed — ending push connection");
                    break;
                };
                if let Err(e) = send_event(&mut sender, &update).await {
                    debug!(error = %e, "WebSocket send failed — disconnecting");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Clients have nothing to say on this channel.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                }
            }
        }
    }

    info!(username = %username, "push connection closed");
}

/// Serialize one price update as a named event and send it.
async fn send_event<S>(sender: &mut S, update: &PriceUpdate) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match encode_event(PRICE_UPDATE_EVENT, update) {
        Some(json) => sender.send(Message::Text(json)).await,
        None => Ok(()),
    }
}

fn encode_event<T: Serialize>(event: &str, data: T) -> Option<String> {
    match serde_json::to_string(&PushEvent { event, data }) {
        Ok(json) => Some(json),
        Err(e) => {
            // Serialisation errors are not network errors; don't disconnect.
            warn!(error = %e, "failed to serialize push event");
            None
        }
    }
}
