// =============================================================================
// Currency Conversion — cached third-party rate lookups
// =============================================================================

pub mod coinmarketcap;
pub mod rate_cache;

pub use coinmarketcap::CoinMarketCapClient;
pub use rate_cache::{RateCache, RateProvider};
