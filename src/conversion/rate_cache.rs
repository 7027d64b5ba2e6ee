// =============================================================================
// Rate Cache — memoised conversion rates with a fixed freshness window
// =============================================================================
//
// Keyed by the ordered (from, to) pair. An entry younger than the window is
// served as-is; anything older triggers exactly one upstream call whose
// result replaces the entry wholesale. Concurrent misses on the same pair
// wait for a single in-flight fetch. Failures are never cached.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::AppError;

/// Source of conversion rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Price of one unit of `from` expressed in `to`.
    async fn fetch_rate(&self, from: &str, to: &str) -> anyhow::Result<f64>;
}

#[derive(Debug, Clone, Copy)]
struct RateEntry {
    rate: f64,
    fetched_at: Instant,
}

type PairKey = (String, String);

pub struct RateCache {
    provider: Arc<dyn RateProvider>,
    ttl: Duration,
    entries: RwLock<HashMap<PairKey, RateEntry>>,
    /// One fetch gate per pair; held while its upstream call is in flight.
    inflight: Mutex<HashMap<PairKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl RateCache {
    pub fn new(provider: Arc<dyn RateProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn fresh(&self, key: &PairKey) -> Option<f64> {
        let entry = self.entries.read().get(key).copied()?;
        (entry.fetched_at.elapsed() < self.ttl).then_some(entry.rate)
    }

    /// Rate for converting `from` into `to`, served from cache when fresh.
    pub async fn lookup(&self, from: &str, to: &str) -> Result<f64, AppError> {
        let key = (from.to_string(), to.to_string());

        if let Some(rate) = self.fresh(&key) {
            debug!(from, to, rate, "conversion rate served from cache");
            return Ok(rate);
        }

        let gate = self.inflight.lock().entry(key.clone()).or_default().clone();
        let _fetching = gate.lock().await;

        // Another caller may have refreshed the pair while we waited.
        if let Some(rate) = self.fresh(&key) {
            debug!(from, to, rate, "conversion rate served from cache");
            return Ok(rate);
        }

        let rate = self.provider.fetch_rate(from, to).await.map_err(|e| {
            warn!(from, to, error = %e, "conversion rate lookup failed");
            AppError::ExternalService(format!("{e:#}"))
        })?;

        self.entries.write().insert(
            key,
            RateEntry {
                rate,
                fetched_at: Instant::now(),
            },
        );
        debug!(from, to, rate, "conversion rate fetched and cached");
        Ok(rate)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}
