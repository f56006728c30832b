//! Exchange Order API (spec.md §2 item 3, §6): place / query / cancel a
//! single order, fetch balances. `binance` implements this against a
//! Binance-shaped REST API, grounded on
//! `original_source/exchange_context/client/banance_client.go`'s
//! HMAC-SHA256 query-string signing and `X-MBX-APIKEY` header.

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::model::{ExchangeOrder, Side, TimeInForce};

#[async_trait]
pub trait ExchangeOrderApi: Send + Sync {
    async fn place_limit(
        &self,
        symbol: &str,
        quantity: f64,
        price: f64,
        side: Side,
        tif: TimeInForce,
    ) -> Result<ExchangeOrder, ExchangeError>;

    async fn query_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError>;

    async fn get_balance(&self, asset: &str) -> Result<f64, ExchangeError>;
}

pub mod binance {
    use super::*;
    use hmac::{Hmac, Mac};
    use serde::Deserialize;
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    /// REST client for a Binance-shaped spot exchange. Grounded on the
    /// original's `Binance` struct (`ApiKey`, `ApiSecret`,
    /// `DestinationURI`) and its `signature`/`sign` HMAC helpers.
    pub struct BinanceRestClient {
        api_key: String,
        api_secret: String,
        base_url: String,
        http: reqwest::Client,
    }

    impl BinanceRestClient {
        pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, base_url: impl Into<String>) -> Self {
            Self {
                api_key: api_key.into(),
                api_secret: api_secret.into(),
                base_url: base_url.into(),
                http: reqwest::Client::new(),
            }
        }

        /// HMAC-SHA256 over a sorted `key=value&...` query string, the
        /// same scheme as `Binance.signature` in the original.
        fn sign(&self, query: &str) -> String {
            let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
                .expect("HMAC accepts a key of any length");
            mac.update(query.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }

        async fn send_signed(&self, path: &str, mut params: Vec<(String, String)>) -> Result<ExchangeOrderResponse, ExchangeError> {
            params.sort_by(|a, b| a.0.cmp(&b.0));
            let query = params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            let signature = self.sign(&query);
            let url = format!("{}{path}?{query}&signature={signature}", self.base_url);

            let response = self
                .http
                .post(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await
                .map_err(|e| ExchangeError::Request(e.to_string()))?;

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ExchangeError::Rejected(body));
            }

            response
                .json::<ExchangeOrderResponse>()
                .await
                .map_err(|e| ExchangeError::Request(e.to_string()))
        }
    }

    #[async_trait]
    impl ExchangeOrderApi for BinanceRestClient {
        async fn place_limit(
            &self,
            symbol: &str,
            quantity: f64,
            price: f64,
            side: Side,
            tif: TimeInForce,
        ) -> Result<ExchangeOrder, ExchangeError> {
            let params = vec![
                ("symbol".into(), symbol.to_string()),
                ("side".into(), side.as_str().to_string()),
                ("type".into(), "LIMIT".to_string()),
                ("quantity".into(), quantity.to_string()),
                ("price".into(), price.to_string()),
                ("timeInForce".into(), tif.as_str().to_string()),
                ("apiKey".into(), self.api_key.clone()),
                ("timestamp".into(), chrono_now_millis().to_string()),
            ];
            self.send_signed("/api/v3/order", params).await.map(Into::into)
        }

        async fn query_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError> {
            let params = vec![
                ("symbol".into(), symbol.to_string()),
                ("orderId".into(), order_id.to_string()),
                ("apiKey".into(), self.api_key.clone()),
                ("timestamp".into(), chrono_now_millis().to_string()),
            ];
            self.send_signed("/api/v3/order", params).await.map(Into::into)
        }

        async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError> {
            let params = vec![
                ("symbol".into(), symbol.to_string()),
                ("orderId".into(), order_id.to_string()),
                ("apiKey".into(), self.api_key.clone()),
                ("timestamp".into(), chrono_now_millis().to_string()),
            ];
            self.send_signed("/api/v3/order", params).await.map(Into::into)
        }

        async fn get_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
            let mut params: Vec<(String, String)> = vec![
                ("apiKey".into(), self.api_key.clone()),
                ("timestamp".into(), chrono_now_millis().to_string()),
            ];
            params.sort_by(|a, b| a.0.cmp(&b.0));
            let query = params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
            let signature = self.sign(&query);
            let url = format!("{}/api/v3/account?{query}&signature={signature}", self.base_url);
            let response = self
                .http
                .get(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await
                .map_err(|e| ExchangeError::Request(e.to_string()))?;

            let account: AccountResponse = response
                .json()
                .await
                .map_err(|e| ExchangeError::Request(e.to_string()))?;

            Ok(account
                .balances
                .into_iter()
                .find(|b| b.asset == asset)
                .map(|b| b.free)
                .unwrap_or(0.0))
        }
    }

    fn chrono_now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    #[derive(Deserialize)]
    struct ExchangeOrderResponse {
        #[serde(rename = "orderId")]
        order_id: i64,
        symbol: String,
        side: String,
        status: String,
        price: String,
        #[serde(rename = "origQty")]
        orig_qty: String,
        #[serde(rename = "executedQty")]
        executed_qty: String,
        #[serde(rename = "cummulativeQuoteQty")]
        cumulative_quote_qty: String,
    }

    impl From<ExchangeOrderResponse> for ExchangeOrder {
        fn from(r: ExchangeOrderResponse) -> Self {
            ExchangeOrder {
                order_id: r.order_id,
                symbol: r.symbol,
                side: if r.side == "BUY" { Side::Buy } else { Side::Sell },
                status: match r.status.as_str() {
                    "NEW" => crate::model::OrderStatus::New,
                    "PARTIALLY_FILLED" => crate::model::OrderStatus::PartiallyFilled,
                    "FILLED" => crate::model::OrderStatus::Filled,
                    "CANCELED" => crate::model::OrderStatus::Canceled,
                    _ => crate::model::OrderStatus::Expired,
                },
                price: r.price.parse().unwrap_or(0.0),
                orig_qty: r.orig_qty.parse().unwrap_or(0.0),
                executed_qty: r.executed_qty.parse().unwrap_or(0.0),
                cumulative_quote_qty: r.cumulative_quote_qty.parse().unwrap_or(0.0),
            }
        }
    }

    #[derive(Deserialize)]
    struct AccountResponse {
        balances: Vec<AccountBalance>,
    }

    #[derive(Deserialize)]
    struct AccountBalance {
        asset: String,
        free: f64,
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory exchange double used across executor/balance tests.
    /// Each call can be scripted to fail once, to exercise the
    /// transient-error retry paths of spec.md §7.
    pub struct FakeExchange {
        balances: Mutex<HashMap<String, f64>>,
        orders: Mutex<HashMap<(String, i64), ExchangeOrder>>,
        next_order_id: Mutex<i64>,
        pub fail_next_place: Mutex<bool>,
        pub fail_next_query: Mutex<bool>,
        pub fail_next_cancel: Mutex<bool>,
    }

    impl FakeExchange {
        pub fn new() -> Self {
            Self {
                balances: Mutex::new(HashMap::new()),
                orders: Mutex::new(HashMap::new()),
                next_order_id: Mutex::new(1),
                fail_next_place: Mutex::new(false),
                fail_next_query: Mutex::new(false),
                fail_next_cancel: Mutex::new(false),
            }
        }

        pub fn set_balance(&self, asset: &str, amount: f64) {
            self.balances.lock().unwrap().insert(asset.to_string(), amount);
        }

        pub fn seed_order(&self, order: ExchangeOrder) {
            self.orders.lock().unwrap().insert((order.symbol.clone(), order.order_id), order);
        }

        /// Replaces the stored state of an existing order (simulates a
        /// fill/cancel observed on the next query).
        pub fn set_order_status(&self, symbol: &str, order_id: i64, status: crate::model::OrderStatus, executed_qty: f64, cumulative_quote_qty: f64) {
            let mut orders = self.orders.lock().unwrap();
            if let Some(order) = orders.get_mut(&(symbol.to_string(), order_id)) {
                order.status = status;
                order.executed_qty = executed_qty;
                order.cumulative_quote_qty = cumulative_quote_qty;
            }
        }
    }

    #[async_trait]
    impl ExchangeOrderApi for FakeExchange {
        async fn place_limit(
            &self,
            symbol: &str,
            quantity: f64,
            price: f64,
            side: Side,
            tif: TimeInForce,
        ) -> Result<ExchangeOrder, ExchangeError> {
            if std::mem::take(&mut *self.fail_next_place.lock().unwrap()) {
                return Err(ExchangeError::Rejected("simulated rejection".into()));
            }
            let mut next_id = self.next_order_id.lock().unwrap();
            let order_id = *next_id;
            *next_id += 1;
            // IOC orders are assumed to clear immediately against
            // available liquidity; GTC orders rest as NEW until a test
            // drives them to a terminal status via `set_order_status`.
            let (status, executed_qty, cumulative_quote_qty) = match tif {
                TimeInForce::Ioc => (crate::model::OrderStatus::Filled, quantity, quantity * price),
                TimeInForce::Gtc => (crate::model::OrderStatus::New, 0.0, 0.0),
            };
            let order = ExchangeOrder {
                order_id,
                symbol: symbol.to_string(),
                side,
                status,
                price,
                orig_qty: quantity,
                executed_qty,
                cumulative_quote_qty,
            };
            self.orders.lock().unwrap().insert((symbol.to_string(), order_id), order.clone());
            Ok(order)
        }

        async fn query_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError> {
            if std::mem::take(&mut *self.fail_next_query.lock().unwrap()) {
                return Err(ExchangeError::Request("simulated timeout".into()));
            }
            self.orders
                .lock()
                .unwrap()
                .get(&(symbol.to_string(), order_id))
                .cloned()
                .ok_or_else(|| ExchangeError::Request("unknown order".into()))
        }

        async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<ExchangeOrder, ExchangeError> {
            if std::mem::take(&mut *self.fail_next_cancel.lock().unwrap()) {
                return Err(ExchangeError::Request("simulated cancel failure".into()));
            }
            let mut orders = self.orders.lock().unwrap();
            let order = orders
                .get_mut(&(symbol.to_string(), order_id))
                .ok_or_else(|| ExchangeError::Request("unknown order".into()))?;
            order.status = crate::model::OrderStatus::Canceled;
            Ok(order.clone())
        }

        async fn get_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
            Ok(self.balances.lock().unwrap().get(asset).copied().unwrap_or(0.0))
        }
    }
}
