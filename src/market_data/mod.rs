pub mod ticker_stream;
pub mod tick_store;

pub use tick_store::TickStore;
