//! Rolling market data buffer feeding the strategy layer (spec.md §2
//! system overview: "ingests real-time market data — aggregate trades,
//! one-minute candles, order-book depth"). Grounded on the teacher's
//! `ingestor.rs::MarketDataBuffer` (a per-symbol rolling buffer guarded
//! by a stall watermark) and `original_source/src/model/kline.go`
//! (`KLine` field shape, `PriceValidSeconds = 30` freshness window,
//! carried over as `Candle::is_expired`).

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::strategy::Trade;

/// How long a candle's close price is trusted before it's considered
/// stale, matching the original's `PriceValidSeconds`.
const PRICE_VALID_SECONDS: i64 = 30;

/// A one-minute candle, the wire shape of the original's `KLine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open: f64,
    pub close: f64,
    pub low: f64,
    pub high: f64,
    pub interval: String,
    pub timestamp: i64,
    pub volume: f64,
    pub updated_at: i64,
}

impl Candle {
    pub fn is_negative(&self) -> bool {
        self.close < self.open
    }

    pub fn is_positive(&self) -> bool {
        self.close > self.open
    }

    pub fn low_percent(&self, percent: f64) -> f64 {
        self.low + (self.low * percent / 100.0)
    }

    /// True once `now - updated_at` exceeds the freshness window.
    pub fn is_expired(&self, now: i64) -> bool {
        (now - self.updated_at) > PRICE_VALID_SECONDS
    }
}

/// A single order-book price level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: f64,
}

/// A full depth snapshot for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub received_at: i64,
}

impl DepthSnapshot {
    pub fn mid_price(&self) -> Option<f64> {
        let best_bid = self.bids.first()?.price;
        let best_ask = self.asks.first()?.price;
        Some((best_bid + best_ask) / 2.0)
    }
}

const TRADE_HISTORY_CAPACITY: usize = 64;

/// Shared rolling buffer of recent trades, latest candle, and latest
/// depth snapshot per symbol, held by the main loop and read by the
/// strategy tick. Grounded on the teacher's `MarketDataBuffer`
/// (`l2_books`/`trade_buffers` maps keyed by coin).
#[derive(Debug, Default)]
pub struct MarketDataBuffer {
    trades: HashMap<String, VecDeque<Trade>>,
    candles: HashMap<String, Candle>,
    depth: HashMap<String, DepthSnapshot>,
}

impl MarketDataBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trade(&mut self, trade: Trade) {
        let buffer = self.trades.entry(trade.symbol.clone()).or_insert_with(VecDeque::new);
        buffer.push_back(trade);
        while buffer.len() > TRADE_HISTORY_CAPACITY {
            buffer.pop_front();
        }
    }

    pub fn recent_trades(&self, symbol: &str) -> Vec<Trade> {
        self.trades.get(symbol).map(|b| b.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn update_candle(&mut self, candle: Candle) {
        self.candles.insert(candle.symbol.clone(), candle);
    }

    pub fn latest_candle(&self, symbol: &str) -> Option<&Candle> {
        self.candles.get(symbol)
    }

    pub fn update_depth(&mut self, snapshot: DepthSnapshot) {
        self.depth.insert(snapshot.symbol.clone(), snapshot);
    }

    pub fn latest_depth(&self, symbol: &str) -> Option<&DepthSnapshot> {
        self.depth.get(symbol)
    }
}
