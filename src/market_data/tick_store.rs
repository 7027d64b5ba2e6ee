// =============================================================================
// Tick Store — latest ticker observation per symbol
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::Tick;

/// Process-wide map from upper-case symbol to its most recent [`Tick`].
///
/// Writes replace the previous entry wholesale (last write wins); no history
/// is kept.
#[derive(Default)]
pub struct TickStore {
    latest: RwLock<HashMap<String, Tick>>,
}

impl TickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `tick`, returning the entry it replaced.
    pub fn apply(&self, tick: Tick) -> Option<Tick> {
        self.latest.write().insert(tick.symbol.clone(), tick)
    }

    pub fn get(&self, symbol: &str) -> Option<Tick> {
        self.latest.read().get(&symbol.to_uppercase()).cloned()
    }

    /// All current ticks sorted by symbol.
    pub fn snapshot(&self) -> Vec<Tick> {
        let mut ticks: Vec<Tick> = self.latest.read().values().cloned().collect();
        ticks.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        ticks
    }

    pub fn len(&self) -> usize {
        self.latest.read().len()
    }
}
