//! Balance Service: a cached asset balance with explicit invalidation
//! (spec.md §2 item 6). The cache is shared across an Order's concurrent
//! swap tasks; only `invalidate` mutates it, and it must be called after
//! every terminal transition and every observed leg cancellation
//! (spec.md §5).

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ExchangeError;
use crate::exchange::ExchangeOrderApi;

pub struct BalanceService {
    exchange: Arc<dyn ExchangeOrderApi>,
    cache: Mutex<HashMap<String, f64>>,
}

impl BalanceService {
    pub fn new(exchange: Arc<dyn ExchangeOrderApi>) -> Self {
        Self { exchange, cache: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached balance unless `force_refresh` is set or
    /// nothing is cached yet, matching `GetAssetBalance(asset, force)`
    /// in the original Go source.
    pub async fn get_asset_balance(&self, asset: &str, force_refresh: bool) -> Result<f64, ExchangeError> {
        if !force_refresh {
            if let Some(balance) = self.cache.lock().await.get(asset).copied() {
                return Ok(balance);
            }
        }

        let balance = self.exchange.get_balance(asset).await?;
        self.cache.lock().await.insert(asset.to_string(), balance);
        Ok(balance)
    }

    pub async fn invalidate_balance_cache(&self, asset: &str) {
        self.cache.lock().await.remove(asset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::tests::FakeExchange;

    #[tokio::test]
    async fn caches_balance_until_invalidated() {
        let fake = Arc::new(FakeExchange::new());
        fake.set_balance("SOL", 100.0);
        let service = BalanceService::new(fake.clone());

        assert_eq!(service.get_asset_balance("SOL", false).await.unwrap(), 100.0);

        fake.set_balance("SOL", 50.0);
        // still cached
        assert_eq!(service.get_asset_balance("SOL", false).await.unwrap(), 100.0);

        service.invalidate_balance_cache("SOL").await;
        assert_eq!(service.get_asset_balance("SOL", false).await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache() {
        let fake = Arc::new(FakeExchange::new());
        fake.set_balance("SOL", 100.0);
        let service = BalanceService::new(fake.clone());
        service.get_asset_balance("SOL", false).await.unwrap();

        fake.set_balance("SOL", 75.0);
        assert_eq!(service.get_asset_balance("SOL", true).await.unwrap(), 75.0);
    }
}
