// ─────────────────────────────────────────────────────────────────────────────
// swapbot: spot-market trading bot / triangular swap execution engine
// ─────────────────────────────────────────────────────────────────────────────
use std::sync::Arc;
use std::time::Duration;

use swapbot::balance::BalanceService;
use swapbot::config::BotConfig;
use swapbot::exchange::binance::BinanceRestClient;
use swapbot::exchange::ExchangeOrderApi;
use swapbot::marketdata::MarketDataBuffer;
use swapbot::order_store::{InMemoryOrderStore, OrderStore};
use swapbot::strategy::{SmaStrategy, Strategy, Trade};
use swapbot::swap_action_store::{InMemorySwapActionStore, InMemorySwapChainStore};
use swapbot::swap_executor::SwapExecutor;
use swapbot::swap_pair_store::InMemorySwapPairStore;
use swapbot::time_source::{SystemTimeSource, TimeSource};

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignored if missing)
    dotenvy::dotenv().ok();

    env_logger::init();
    log::info!("swapbot starting...");

    // ─── Environment config ────────────────────────────────────────────────
    let config = BotConfig::from_env();

    // ─── Exchange client ───────────────────────────────────────────────────
    let exchange: Arc<dyn ExchangeOrderApi> = Arc::new(BinanceRestClient::new(
        config.api_key.clone(),
        config.api_secret.clone(),
        config.exchange_base_url.clone(),
    ));

    // ─── Shared stores (spec.md §2 items 4-7, 9) ──────────────────────────
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let action_store = Arc::new(InMemorySwapActionStore::new());
    let chain_store = Arc::new(InMemorySwapChainStore::new());
    let pair_store = Arc::new(InMemorySwapPairStore::new());
    let order_store = Arc::new(InMemoryOrderStore::new());
    let balance = Arc::new(BalanceService::new(exchange.clone()));

    let executor = Arc::new(SwapExecutor::new(
        exchange.clone(),
        time.clone(),
        action_store.clone(),
        chain_store.clone(),
        pair_store.clone(),
        order_store.clone(),
        balance.clone(),
    ));

    // ─── Market data + strategy loop ──────────────────────────────────────
    let data_buffer = Arc::new(tokio::sync::Mutex::new(MarketDataBuffer::new()));
    let strategy = Arc::new(tokio::sync::Mutex::new(SmaStrategy::new()));

    {
        let buffer = data_buffer.clone();
        let strategy = strategy.clone();
        let time = time.clone();
        let tick = config.strategy_tick_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let _buf = buffer.lock().await;
                // A live deployment would drain freshly ingested trades
                // here; left to external market-data plumbing (spec.md
                // §1 non-goals: ingestion transport is out of scope).
                let mut guard = strategy.lock().await;
                let _: &mut dyn Strategy = &mut *guard;
                let _ = time.now_unix();
            }
        });
    }

    // ─── Swap executor poll loop (spec.md §5) ─────────────────────────────
    //
    // `SwapExecutor::execute` advances exactly one leg-step per call and
    // returns; this loop owns the repeated invocation that used to be a
    // per-order blocking goroutine in the original service (see
    // DESIGN.md, Open Question decision 5).
    {
        let executor = executor.clone();
        let order_store = order_store.clone();
        let poll_interval = config.swap_poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                poll_active_swaps(&executor, order_store.as_ref()).await;
            }
        });
    }

    log::info!("All systems active. Entering main loop...");
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
}

/// Re-drives every order still mid-swap through one more executor tick.
async fn poll_active_swaps(executor: &SwapExecutor, order_store: &dyn OrderStore) {
    let orders = match order_store.active_swap_orders().await {
        Ok(orders) => orders,
        Err(e) => {
            log::error!("failed to list active swap orders: {e}");
            return;
        }
    };
    for order in orders {
        let order_id = order.id;
        let outcome = executor.execute(order).await;
        log::debug!("swap poll: order {order_id} -> {outcome:?}");
    }
}

#[allow(dead_code)]
fn feed_trade(_strategy: &mut dyn Strategy, _trade: Trade) {}
