// =============================================================================
// Central Application State
// =============================================================================
//
// Ties the injected services together. Handlers and the feed task hold an
// `Arc<AppState>`; each service manages its own interior mutability
// (parking_lot locks, broadcast channel, SQLite pool).
// =============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::accounts::{SessionStore, UserStore};
use crate::binance::CandleSource;
use crate::config::DashboardConfig;
use crate::conversion::{RateCache, RateProvider};
use crate::market_data::TickStore;
use crate::relay::BroadcastHub;

pub struct AppState {
    pub config: DashboardConfig,

    // ── Live prices ─────────────────────────────────────────────────────
    pub ticks: TickStore,
    pub hub: BroadcastHub,

    // ── Upstream lookups ────────────────────────────────────────────────
    pub rates: RateCache,
    pub candles: Arc<dyn CandleSource>,

    // ── Accounts ────────────────────────────────────────────────────────
    pub users: UserStore,
    pub sessions: SessionStore,

    /// Instant the service started. Used for uptime reporting.
    pub start_time: std::time::Instant,
}

/// Operational summary served by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub symbols_tracked: usize,
    pub subscribers: usize,
    pub cached_rates: usize,
    pub active_sessions: usize,
    pub uptime_secs: u64,
    pub server_time: i64,
}

impl AppState {
    pub fn new(
        config: DashboardConfig,
        rate_provider: Arc<dyn RateProvider>,
        candles: Arc<dyn CandleSource>,
        users: UserStore,
    ) -> Self {
        let rates = RateCache::new(rate_provider, config.rate_cache_ttl());
        let sessions = SessionStore::new(config.session_ttl());
        let hub = BroadcastHub::new(config.broadcast_capacity);

        Self {
            config,
            ticks: TickStore::new(),
            hub,
            rates,
            candles,
            users,
            sessions,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            symbols_tracked: self.ticks.len(),
            subscribers: self.hub.subscriber_count(),
            cached_rates: self.rates.len(),
            active_sessions: self.sessions.len(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            server_time: chrono::Utc::now().timestamp_millis(),
        }
    }
}
