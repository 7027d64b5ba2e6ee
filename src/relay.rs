// =============================================================================
// Broadcast Relay — fan-out of price updates to connected dashboards
// =============================================================================
//
// Publish/subscribe hub over a tokio broadcast channel. Each browser
// connection holds one `Subscription` for its lifetime; dropping it
// unsubscribes. Publishing never blocks: a subscriber that falls behind skips
// the ticks it missed.
// =============================================================================

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::types::{PriceUpdate, Tick};

#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<PriceUpdate>,
}

impl BroadcastHub {
    /// Create a hub whose per-subscriber backlog holds `capacity` updates.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Push `tick` to every live subscriber. Returns how many received it.
    pub fn publish(&self, tick: &Tick) -> usize {
        // Err only means nobody is listening.
        self.sender.send(PriceUpdate::from(tick)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        let receiver = self.sender.subscribe();
        debug!(subscribers = self.subscriber_count(), "relay subscription opened");
        Subscription { receiver }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// One client's view of the relay.
pub struct Subscription {
    receiver: broadcast::Receiver<PriceUpdate>,
}

impl Subscription {
    /// Next update, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<PriceUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) => return Some(update),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "relay subscriber lagged — skipping missed ticks");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("relay subscription closed");
    }
}
