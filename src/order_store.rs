//! Order Store: the only mutation the swap executor performs on the
//! upstream `Order` is flipping `swap = false` on termination
//! (spec.md §2 item 5, §6).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::model::Order;

#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    async fn update(&self, order: &Order) -> Result<(), StoreError>;
    async fn get(&self, id: i64) -> Result<Order, StoreError>;

    /// Orders still mid-swap (`swap = true`), for the poll loop that
    /// re-drives `SwapExecutor::execute` (spec.md §5).
    async fn active_swap_orders(&self) -> Result<Vec<Order>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<i64, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) {
        self.orders.write().unwrap().insert(order.id, order);
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        self.orders.write().unwrap().insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Order, StoreError> {
        self.orders.read().unwrap().get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn active_swap_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.orders.read().unwrap().values().filter(|o| o.swap).cloned().collect())
    }
}
