//! Shared data model for the swap engine: quotes, chains, the durable
//! swap action record, and the exchange-order wire shape.

use serde::{Deserialize, Serialize};

/// A signed percentage. Carried over from the original bot's `Percent`
/// type (`exchange_context/model/order.go`) because callers throughout
/// the executor compare percentages rather than raw floats.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percent(pub f64);

impl Percent {
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn gt(self, other: Percent) -> bool {
        self.0 > other.0
    }

    pub fn gte(self, other: Percent) -> bool {
        self.0 >= other.0
    }

    pub fn lt(self, other: Percent) -> bool {
        self.0 < other.0
    }

    pub fn lte(self, other: Percent) -> bool {
        self.0 <= other.0
    }
}

/// `BUY` or `SELL`, preserved as the exchange's own vocabulary rather
/// than a more abstract `Bid`/`Ask` so wire serialization matches what
/// the exchange expects verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Time-in-force for a limit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
        }
    }
}

/// A live quote for one exchange symbol (spec.md §3 `SwapPair`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapPair {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub price_timestamp: i64,
    pub min_notional: f64,
    pub min_quantity: f64,
    pub min_price: f64,
}

impl SwapPair {
    /// Panics on construction of an invariant-violating quote — mirrors
    /// the teacher's light validation style (e.g. `Position::calc_pnl`
    /// assumes well-formed input) rather than threading a `Result`
    /// through every quote refresh.
    pub fn new(
        symbol: impl Into<String>,
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
        buy_price: f64,
        sell_price: f64,
        price_timestamp: i64,
        min_notional: f64,
        min_quantity: f64,
        min_price: f64,
    ) -> Self {
        debug_assert!(buy_price > 0.0, "buy_price must be positive");
        debug_assert!(sell_price > 0.0, "sell_price must be positive");
        debug_assert!(min_price > 0.0, "min_price must be positive");
        Self {
            symbol: symbol.into(),
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
            buy_price,
            sell_price,
            price_timestamp,
            min_notional,
            min_quantity,
            min_price,
        }
    }
}

/// Which leg of a three-leg chain we're talking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegIndex {
    One,
    Two,
    Three,
}

/// The side pattern of a swap chain's three legs (spec.md §3).
///
/// All chains begin with a SELL of the starting asset; leg 3 always
/// returns funds to that same asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainType {
    /// SELL, SELL, BUY
    Ssb,
    /// SELL, BUY, SELL
    Sbs,
    /// SELL, BUY, BUY
    Sbb,
}

impl ChainType {
    /// The exchange side to use when posting the given leg.
    pub fn leg_side(self, leg: LegIndex) -> Side {
        use ChainType::*;
        use LegIndex::*;
        match (self, leg) {
            (_, One) => Side::Sell,
            (Ssb, Two) => Side::Sell,
            (Sbs, Two) | (Sbb, Two) => Side::Buy,
            (Ssb, Three) | (Sbb, Three) => Side::Buy,
            (Sbs, Three) => Side::Sell,
        }
    }

    pub fn is_ssb(self) -> bool {
        matches!(self, ChainType::Ssb)
    }

    pub fn is_sbs(self) -> bool {
        matches!(self, ChainType::Sbs)
    }

    pub fn is_sbb(self) -> bool {
        matches!(self, ChainType::Sbb)
    }
}

/// One leg of a proposed `SwapChain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapLeg {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price: f64,
}

/// An immutable candidate three-leg swap proposal (spec.md §3 `SwapChain`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapChain {
    pub id: i64,
    pub chain_type: ChainType,
    pub swap_one: SwapLeg,
    pub swap_two: SwapLeg,
    pub swap_three: SwapLeg,
    pub predicted_percent: f64,
}

impl SwapChain {
    pub fn leg(&self, leg: LegIndex) -> &SwapLeg {
        match leg {
            LegIndex::One => &self.swap_one,
            LegIndex::Two => &self.swap_two,
            LegIndex::Three => &self.swap_three,
        }
    }
}

/// Lifecycle state of a `SwapAction` (spec.md §3 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapActionStatus {
    Pending,
    Process,
    Success,
    Canceled,
}

impl SwapActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SwapActionStatus::Success | SwapActionStatus::Canceled)
    }
}

/// Per-leg mutable fields of a `SwapAction`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegState {
    pub symbol: String,
    pub price: f64,
    pub external_id: Option<i64>,
    pub timestamp: Option<i64>,
    pub external_status: Option<String>,
}

/// The durable, mutable execution record for an in-flight swap
/// (spec.md §3 `SwapAction`). Every leg transition persists this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapAction {
    pub id: i64,
    pub order_id: i64,
    pub swap_chain_id: i64,
    pub asset: String,

    pub status: SwapActionStatus,
    pub start_timestamp: i64,
    pub end_timestamp: Option<i64>,
    pub start_quantity: f64,
    pub end_quantity: Option<f64>,

    pub swap_one: LegState,
    pub swap_two: LegState,
    pub swap_three: LegState,
}

impl SwapAction {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, SwapActionStatus::Pending)
    }

    pub fn leg(&self, leg: LegIndex) -> &LegState {
        match leg {
            LegIndex::One => &self.swap_one,
            LegIndex::Two => &self.swap_two,
            LegIndex::Three => &self.swap_three,
        }
    }

    pub fn leg_mut(&mut self, leg: LegIndex) -> &mut LegState {
        match leg {
            LegIndex::One => &mut self.swap_one,
            LegIndex::Two => &mut self.swap_two,
            LegIndex::Three => &mut self.swap_three,
        }
    }
}

/// The upstream position being converted (spec.md §3 `Order`). Only
/// `id`/`symbol`/`swap` are consumed by the swap executor; the rest of
/// the shape is carried for fidelity with the rest of the bot
/// (`original_source/exchange_context/model/order.go`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub symbol: String,
    pub swap: bool,
    pub price: f64,
    pub quantity: f64,
    pub executed_quantity: f64,
    pub operation: Side,
}

impl Order {
    pub fn base_asset(&self) -> String {
        self.symbol.replace("USDT", "")
    }
}

/// Exchange order status (`NEW` / `PARTIALLY_FILLED` / `FILLED` /
/// `CANCELED` / `EXPIRED`), with `_RB`/`_FORCE` suffixed variants used
/// only in `SwapAction::*_external_status` once a leg has been
/// rewritten by rollback or force-swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
        }
    }
}

/// The exchange's reply to place/query (spec.md §3 `BinanceOrder`,
/// named neutrally as `ExchangeOrder`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub order_id: i64,
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    pub price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
}

impl ExchangeOrder {
    pub fn is_new(&self) -> bool {
        self.status == OrderStatus::New
    }

    pub fn is_partially_filled(&self) -> bool {
        self.status == OrderStatus::PartiallyFilled
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    pub fn is_canceled(&self) -> bool {
        self.status == OrderStatus::Canceled
    }

    pub fn is_expired(&self) -> bool {
        self.status == OrderStatus::Expired
    }

    /// `executed_qty` is at least `fraction` of `orig_qty` — used by
    /// the leg-3 long-tail tolerance (spec.md §4.2).
    pub fn is_nearly_filled(&self, fraction: f64) -> bool {
        if self.orig_qty <= 0.0 {
            return false;
        }
        self.executed_qty / self.orig_qty >= fraction
    }
}
