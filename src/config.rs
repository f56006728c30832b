//! Runtime configuration loaded from environment variables (spec.md §6
//! "external interfaces" — the bot's process boundary). Grounded on the
//! teacher's `main.rs` env var block (`MM_HARVEST_TICKS`,
//! `MM_SHADOW_MODE`, `REDIS_URL`): parse-with-default, log the resolved
//! value, never hard-fail on an optional var.

use std::time::Duration;

/// Resolved bot configuration for one process lifetime.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Binance-shaped REST base URL.
    pub exchange_base_url: String,
    pub api_key: String,
    pub api_secret: String,

    /// Starting asset the swap finder searches cycles from.
    pub swap_starting_asset: String,
    /// Minimum predicted percent gain for the finder to propose a chain.
    pub swap_min_predicted_percent: f64,

    /// Poll interval for `SwapExecutor::execute` re-invocation (spec.md §5).
    pub swap_poll_interval: Duration,
    /// Tick interval for the strategy loop.
    pub strategy_tick_interval: Duration,

    /// If true, no real orders are placed (mirrors the teacher's shadow mode).
    pub shadow_mode: bool,
}

impl BotConfig {
    pub fn from_env() -> Self {
        let exchange_base_url = std::env::var("EXCHANGE_BASE_URL")
            .unwrap_or_else(|_| "https://api.binance.com".to_string());
        let api_key = std::env::var("EXCHANGE_API_KEY").unwrap_or_default();
        let api_secret = std::env::var("EXCHANGE_API_SECRET").unwrap_or_default();

        let swap_starting_asset = std::env::var("SWAP_STARTING_ASSET").unwrap_or_else(|_| "USDT".to_string());
        let swap_min_predicted_percent = std::env::var("SWAP_MIN_PREDICTED_PERCENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.5);

        let swap_poll_interval = Duration::from_millis(
            std::env::var("SWAP_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2_000),
        );
        let strategy_tick_interval = Duration::from_millis(
            std::env::var("STRATEGY_TICK_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000),
        );

        let shadow_mode = std::env::var("SHADOW_MODE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let config = Self {
            exchange_base_url,
            api_key,
            api_secret,
            swap_starting_asset,
            swap_min_predicted_percent,
            swap_poll_interval,
            strategy_tick_interval,
            shadow_mode,
        };

        log::info!("  Exchange base URL: {}", config.exchange_base_url);
        log::info!("  Swap starting asset: {}", config.swap_starting_asset);
        log::info!(
            "  Shadow mode: {}",
            if config.shadow_mode { "ON (no real orders)" } else { "⚠️  LIVE!" }
        );

        config
    }
}
