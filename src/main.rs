// =============================================================================
// Ticker Dashboard — Main Entry Point
// =============================================================================
//
// Starts the live ticker feed, a periodic session purge and the HTTP server,
// then waits for Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod accounts;
mod api;
mod app_state;
mod binance;
mod config;
mod conversion;
mod error;
mod market_data;
mod relay;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::accounts::{PasswordHasher, UserStore};
use crate::app_state::AppState;
use crate::binance::BinanceClient;
use crate::config::DashboardConfig;
use crate::conversion::CoinMarketCapClient;

const CONFIG_PATH: &str = "dashboard_config.json";
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Ticker Dashboard — starting up");

    let config = DashboardConfig::load(CONFIG_PATH)
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            DashboardConfig::default()
        })
        .apply_env();

    if config.rate_api_key.is_empty() {
        warn!("COINMARKETCAP_API_KEY is not set — currency conversion will fail upstream");
    }
    info!(symbols = ?config.symbols, "Configured allow-list");

    // ── 2. Services ──────────────────────────────────────────────────────
    let users = UserStore::open(
        &config.database_path,
        PasswordHasher::new(config.password_iterations),
    )
    .await?;

    let rate_provider = Arc::new(CoinMarketCapClient::new(
        config.rate_api_url.clone(),
        &config.rate_api_key,
        config.http_timeout(),
    )?);
    let candles = Arc::new(BinanceClient::new(
        config.klines_api_url.clone(),
        config.klines_limit,
        config.http_timeout(),
    )?);

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, rate_provider, candles, users));

    // ── 3. Live ticker feed ──────────────────────────────────────────────
    tokio::spawn(market_data::ticker_stream::supervise(state.clone()));

    // ── 4. Session purge ─────────────────────────────────────────────────
    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_state.sessions.purge_expired();
            if purged > 0 {
                debug!(purged, "expired sessions removed");
            }
        }
    });

    // ── 5. HTTP server ───────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP server at {bind_addr}"))?;
    info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(listener, api::rest::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            warn!("Shutdown signal received — stopping gracefully");
        })
        .await
        .context("HTTP server failed")?;

    info!("Ticker Dashboard shut down complete.");
    Ok(())
}
