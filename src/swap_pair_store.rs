//! Swap Pair Store: read-only lookup of the latest live quote for a
//! symbol (spec.md §2 item 4). Grounded on the query shape of
//! `original_source/src/repository/exhange_repository.go`
//! (`MinPrice`/`MinQuantity`/`MinNotional`/`BuyPrice`/`SellPrice`).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::model::SwapPair;

#[async_trait::async_trait]
pub trait SwapPairStore: Send + Sync {
    async fn get_by_symbol(&self, symbol: &str) -> Result<SwapPair, StoreError>;
}

/// Read-only from the executor's perspective; tests mutate it directly
/// via `set` to simulate price movement between polls.
#[derive(Default)]
pub struct InMemorySwapPairStore {
    pairs: RwLock<HashMap<String, SwapPair>>,
}

impl InMemorySwapPairStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pair: SwapPair) {
        self.pairs.write().unwrap().insert(pair.symbol.clone(), pair);
    }
}

#[async_trait::async_trait]
impl SwapPairStore for InMemorySwapPairStore {
    async fn get_by_symbol(&self, symbol: &str) -> Result<SwapPair, StoreError> {
        self.pairs
            .read()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}
