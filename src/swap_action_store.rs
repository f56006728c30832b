//! Swap Action Store + Swap Chain Store: durable state of an in-flight
//! swap and the immutable chain proposal it follows (spec.md §2 items 7
//! & 9, §6).
//!
//! `get_active_swap_action` returns a typed `StoreError::NotFound`
//! instead of requiring callers to substring-match
//! `"no rows in result set"` (spec.md §9 REDESIGN FLAGS).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::model::{Order, SwapAction, SwapChain};

#[async_trait::async_trait]
pub trait SwapActionStore: Send + Sync {
    async fn get_active_swap_action(&self, order: &Order) -> Result<SwapAction, StoreError>;
    async fn update_swap_action(&self, action: &SwapAction) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait SwapChainStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<SwapChain, StoreError>;
}

#[derive(Default)]
pub struct InMemorySwapActionStore {
    /// Keyed by `order_id`; only one active action per order at a time,
    /// mirroring `GetActiveSwapAction(order)` in the original.
    actions: RwLock<HashMap<i64, SwapAction>>,
}

impl InMemorySwapActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, action: SwapAction) {
        self.actions.write().unwrap().insert(action.order_id, action);
    }

    pub fn get(&self, order_id: i64) -> Option<SwapAction> {
        self.actions.read().unwrap().get(&order_id).cloned()
    }
}

#[async_trait::async_trait]
impl SwapActionStore for InMemorySwapActionStore {
    async fn get_active_swap_action(&self, order: &Order) -> Result<SwapAction, StoreError> {
        self.actions
            .read()
            .unwrap()
            .get(&order.id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_swap_action(&self, action: &SwapAction) -> Result<(), StoreError> {
        self.actions.write().unwrap().insert(action.order_id, action.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySwapChainStore {
    chains: RwLock<HashMap<i64, SwapChain>>,
}

impl InMemorySwapChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, chain: SwapChain) {
        self.chains.write().unwrap().insert(chain.id, chain);
    }
}

#[async_trait::async_trait]
impl SwapChainStore for InMemorySwapChainStore {
    async fn get_by_id(&self, id: i64) -> Result<SwapChain, StoreError> {
        self.chains.read().unwrap().get(&id).cloned().ok_or(StoreError::NotFound)
    }
}
