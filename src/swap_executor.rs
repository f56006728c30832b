//! The Swap Execution Engine (spec.md §4): sequences the three legs of
//! a `SwapChain`, persisting before every externally-visible action so a
//! crash mid-swap resumes from exactly where it left off. Grounded
//! line-by-line on `original_source/src/service/swap_executor.go`.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::balance::BalanceService;
use crate::error::SwapError;
use crate::exchange::ExchangeOrderApi;
use crate::formatter::{compare_percentage, format_price, format_quantity};
use crate::model::{ChainType, ExchangeOrder, LegIndex, LegState, Order, Side, SwapAction, SwapActionStatus, SwapChain, TimeInForce};
use crate::order_store::OrderStore;
use crate::swap_action_store::{SwapActionStore, SwapChainStore};
use crate::swap_pair_store::SwapPairStore;
use crate::time_source::TimeSource;

/// Minimum acceptable return, as a percent of `start_quantity`, for
/// both rollback (leg 2) and force-swap (leg 3) to proceed.
const MIN_SALVAGE_PERCENT: f64 = 0.75;
/// How many times the rollback/force-swap loops step the price by one
/// more tick before giving up.
const MAX_SALVAGE_ATTEMPTS: i64 = 100;
/// Fraction of `orig_qty` considered "close enough" for the leg-3
/// long-tail tolerance.
const LONG_TAIL_FILL_FRACTION: f64 = 0.98;

/// Outcome of one call to [`SwapExecutor::execute`]. Every branch that
/// isn't a genuine transient failure is folded into this instead of an
/// `Err`, matching the original's "log and return" control flow: most
/// of what would be an error in a request/response handler is routine
/// here, since `execute` gets called again on the next poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// The chain reached a terminal status this call.
    Terminated(SwapActionStatus),
    /// Nothing terminal happened; call again later.
    Pending,
    /// There was no active swap action for this order; nothing to do.
    NoActiveAction,
}

pub struct SwapExecutor {
    exchange: Arc<dyn ExchangeOrderApi>,
    time: Arc<dyn TimeSource>,
    action_store: Arc<dyn SwapActionStore>,
    chain_store: Arc<dyn SwapChainStore>,
    pair_store: Arc<dyn SwapPairStore>,
    order_store: Arc<dyn OrderStore>,
    balance: Arc<BalanceService>,
}

/// What a leg attempt produced.
enum LegOutcome {
    /// The leg's order filled (or the long-tail tolerance accepted a
    /// partial fill); the chain can move to the next leg.
    Filled(ExchangeOrder),
    /// No fill yet, or the chain already terminated inside this leg.
    /// Either way `execute` should return without further work.
    Pending,
}

impl SwapExecutor {
    pub fn new(
        exchange: Arc<dyn ExchangeOrderApi>,
        time: Arc<dyn TimeSource>,
        action_store: Arc<dyn SwapActionStore>,
        chain_store: Arc<dyn SwapChainStore>,
        pair_store: Arc<dyn SwapPairStore>,
        order_store: Arc<dyn OrderStore>,
        balance: Arc<BalanceService>,
    ) -> Self {
        Self { exchange, time, action_store, chain_store, pair_store, order_store, balance }
    }

    /// Entry point (spec.md §4.1). Advances the swap attached to
    /// `order` by one step; callers are expected to invoke this
    /// repeatedly (a poll loop) until it returns a terminal outcome.
    pub async fn execute(&self, mut order: Order) -> ExecuteOutcome {
        let mut action = match self.action_store.get_active_swap_action(&order).await {
            Ok(action) => action,
            Err(_) => {
                order.swap = false;
                if let Err(e) = self.order_store.update(&order).await {
                    error!("failed to clear swap flag on order {}: {e}", order.id);
                }
                return ExecuteOutcome::NoActiveAction;
            }
        };

        // Sampled only for observability; never acted on directly.
        match self.balance.get_asset_balance(&action.asset, false).await {
            Ok(b) => debug!("swap action {}: balance_before({}) = {b}", action.id, action.asset),
            Err(e) => warn!("swap action {}: balance_before lookup failed: {e}", action.id),
        }

        if action.is_pending() {
            action.status = SwapActionStatus::Process;
            if let Err(e) = self.action_store.update_swap_action(&action).await {
                error!("failed to mark swap action {} as Process: {e}", action.id);
                return ExecuteOutcome::Pending;
            }
        }

        let chain = match self.chain_store.get_by_id(action.swap_chain_id).await {
            Ok(chain) => chain,
            Err(_) => {
                warn!("swap action {}: swap chain {} missing", action.id, action.swap_chain_id);
                return ExecuteOutcome::Pending;
            }
        };

        let leg_one = match self.run_leg(LegIndex::One, &mut action, &chain, &mut order, None).await {
            LegOutcome::Filled(order) => order,
            LegOutcome::Pending => return ExecuteOutcome::Pending,
        };

        let leg_two = match self.run_leg(LegIndex::Two, &mut action, &chain, &mut order, Some(&leg_one)).await {
            LegOutcome::Filled(order) => order,
            LegOutcome::Pending => return ExecuteOutcome::Pending,
        };

        let leg_three = match self.run_leg(LegIndex::Three, &mut action, &chain, &mut order, Some(&leg_two)).await {
            LegOutcome::Filled(order) => order,
            LegOutcome::Pending => return ExecuteOutcome::Pending,
        };

        let end_quantity = if chain.chain_type.is_sbs() { leg_three.cumulative_quote_qty } else { leg_three.executed_qty };

        action.end_quantity = Some(end_quantity);
        action.end_timestamp = Some(self.time.now_unix());
        action.status = SwapActionStatus::Success;
        self.persist_terminal(&action).await;

        order.swap = false;
        if let Err(e) = self.order_store.update(&order).await {
            error!("failed to clear swap flag on order {}: {e}", order.id);
        }
        self.balance.invalidate_balance_cache(&action.asset).await;

        match self.balance.get_asset_balance(&action.asset, true).await {
            Ok(b) => info!("swap action {} succeeded: balance_after({}) = {b}, end_quantity = {end_quantity}", action.id, action.asset),
            Err(e) => warn!("swap action {} succeeded but balance_after lookup failed: {e}", action.id),
        }

        ExecuteOutcome::Terminated(SwapActionStatus::Success)
    }

    /// Persists a terminal `SwapAction` write. A failure here leaves the
    /// exchange and our own state permanently disagreeing about a
    /// completed swap, so it panics rather than silently continuing
    /// (spec.md §7.7).
    async fn persist_terminal(&self, action: &SwapAction) {
        if let Err(e) = self.action_store.update_swap_action(action).await {
            panic!("persisting terminal swap action {} failed: {e}", action.id);
        }
    }

    /// Drives one leg through post-or-adopt and settle (spec.md §4.2).
    /// `prev` is the previous leg's filled order, used to size this
    /// leg's quantity; `None` only for leg 1, which uses
    /// `action.start_quantity` instead.
    ///
    /// Each call makes exactly one exchange call for this leg (a post,
    /// or a single settle query) and returns; a caller-driven poll loop
    /// (spec.md §5) re-invokes `execute` to advance further. The
    /// original service instead parked one goroutine per in-flight swap
    /// and slept for real between polls — fine for a single long-lived
    /// process, but it turns a multi-hour leg-3 wait into a multi-hour
    /// blocked task here. Ticking once per call keeps the same
    /// persist-before-act contract while staying a plain, schedulable
    /// unit of async work.
    async fn run_leg(
        &self,
        leg: LegIndex,
        action: &mut SwapAction,
        chain: &SwapChain,
        order: &mut Order,
        prev: Option<&ExchangeOrder>,
    ) -> LegOutcome {
        let symbol = action.leg(leg).symbol.clone();

        if action.leg(leg).external_id.is_none() {
            match self.post_leg(leg, action, chain, &symbol, prev).await {
                Some(placed) if placed.is_filled() => LegOutcome::Filled(placed),
                Some(_) => LegOutcome::Pending,
                None => LegOutcome::Pending,
            }
        } else {
            self.settle_tick(leg, action, chain, order, &symbol).await
        }
    }

    /// Posts a new order for `leg`, or handles the case where posting
    /// fails. Returns `None` if the caller should stop (either a
    /// terminal leg-1 post failure, or a transient condition at any
    /// leg).
    async fn post_leg(
        &self,
        leg: LegIndex,
        action: &mut SwapAction,
        chain: &SwapChain,
        symbol: &str,
        prev: Option<&ExchangeOrder>,
    ) -> Option<ExchangeOrder> {
        let pair = match self.pair_store.get_by_symbol(symbol).await {
            Ok(pair) => pair,
            Err(_) => {
                if leg == LegIndex::One {
                    self.cancel_leg_one_terminally(action, "swap pair unavailable").await;
                }
                return None;
            }
        };

        let quantity = match self.leg_quantity(leg, chain, action, prev).await {
            Ok(q) => q,
            Err(_) => {
                if leg == LegIndex::One {
                    self.cancel_leg_one_terminally(action, "balance lookup failed").await;
                }
                return None;
            }
        };

        let side = chain.chain_type.leg_side(leg);
        let price = action.leg(leg).price;
        let raw_order_qty = if side == Side::Sell { quantity } else { quantity / price };
        let fmt_qty = format_quantity(&pair, raw_order_qty);
        let fmt_price = format_price(&pair, price);

        match self.exchange.place_limit(symbol, fmt_qty, fmt_price, side, TimeInForce::Gtc).await {
            Ok(placed) => {
                let leg_state = action.leg_mut(leg);
                leg_state.external_id = Some(placed.order_id);
                leg_state.timestamp = Some(self.time.now_unix());
                leg_state.external_status = Some(placed.status.as_str().to_string());
                if let Err(e) = self.action_store.update_swap_action(action).await {
                    error!("failed to persist leg {leg:?} post for swap action {}: {e}", action.id);
                }
                Some(placed)
            }
            Err(e) => {
                if leg == LegIndex::One {
                    warn!("swap action {}: leg 1 post failed: {e}", action.id);
                    self.cancel_leg_one_terminally(action, &e.to_string()).await;
                } else {
                    warn!("swap action {}: leg {leg:?} post failed, will retry: {e}", action.id);
                }
                None
            }
        }
    }

    /// One settle-phase tick for an already-posted leg order (spec.md
    /// §4.2): a single re-query, persisted status update, and deadline
    /// check. Handles both the plain "adopt a resting order" case and
    /// the "decide whether this leg's deadline has passed" case, since
    /// they're the same re-query against the same order.
    async fn settle_tick(&self, leg: LegIndex, action: &mut SwapAction, chain: &SwapChain, order: &mut Order, symbol: &str) -> LegOutcome {
        let order_id = action.leg(leg).external_id.expect("settle_tick requires a posted order");
        let current = match self.exchange.query_order(symbol, order_id).await {
            Ok(o) => o,
            Err(e) => {
                debug!("swap action {}: leg {leg:?} settle query failed, retrying: {e}", action.id);
                return LegOutcome::Pending;
            }
        };

        if current.is_canceled() || current.is_expired() {
            self.clear_leg_externally_canceled(leg, action).await;
            return LegOutcome::Pending;
        }

        let leg_state = action.leg_mut(leg);
        leg_state.timestamp = Some(self.time.now_unix());
        leg_state.external_status = Some(current.status.as_str().to_string());
        if let Err(e) = self.action_store.update_swap_action(action).await {
            error!("failed to persist leg {leg:?} settle tick for swap action {}: {e}", action.id);
        }

        if current.is_filled() {
            return LegOutcome::Filled(current);
        }

        match leg {
            LegIndex::One => {
                if current.is_new() && self.time.diff_minutes(action.start_timestamp) >= 1 {
                    if self.exchange.cancel_order(&current.symbol, current.order_id).await.is_ok() {
                        self.cancel_leg_one_terminally(action, "leg 1 deadline exceeded").await;
                    }
                }
            }
            LegIndex::Two => {
                let deadline_hit = current.is_new() && self.time.diff_minutes(action.swap_one.timestamp.unwrap_or(action.start_timestamp)) > 5;
                if deadline_hit {
                    match self.try_rollback_leg_two(action, chain).await {
                        Ok(()) => {}
                        Err(e) => warn!("swap action {}: leg 2 rollback failed, will keep polling: {e}", action.id),
                    }
                }
            }
            LegIndex::Three => {
                if let Some(outcome) = self.check_leg_three_long_tail(action, order, &current).await {
                    return outcome;
                }

                let deadline_hit = current.is_new()
                    && (self.time.diff_minutes(action.swap_two.timestamp.unwrap_or(action.start_timestamp)) > 10
                        || self.leg_three_price_drifted(chain, action, &current).await);
                if deadline_hit {
                    match self.try_force_swap_leg_three(action, chain).await {
                        Ok(()) => {}
                        Err(e) => warn!("swap action {}: leg 3 force-swap failed, will keep polling: {e}", action.id),
                    }
                }
            }
        }

        LegOutcome::Pending
    }

    /// Leg-3 long-tail tolerance (spec.md §4.2): if a partial fill has
    /// been sitting for over 4 hours and has filled almost completely,
    /// accept it rather than waiting forever for the last sliver.
    async fn check_leg_three_long_tail(&self, action: &mut SwapAction, order: &mut Order, current: &ExchangeOrder) -> Option<LegOutcome> {
        if !current.is_partially_filled() {
            return None;
        }
        if self.time.diff_minutes(action.start_timestamp) <= 240 {
            return None;
        }
        if !current.is_nearly_filled(LONG_TAIL_FILL_FRACTION) {
            return None;
        }

        info!("swap action {}: leg 3 long-tail tolerance accepted a partial fill", action.id);
        // Recorded here for crash safety; `execute`'s terminal write
        // recomputes the authoritative value once leg 3 is in hand.
        action.end_quantity = Some(current.executed_qty);
        if let Err(e) = self.action_store.update_swap_action(action).await {
            error!("failed to persist leg 3 long-tail interim state for swap action {}: {e}", action.id);
        }
        let _ = order;
        Some(LegOutcome::Filled(current.clone()))
    }

    async fn leg_three_price_drifted(&self, chain: &SwapChain, action: &SwapAction, current: &ExchangeOrder) -> bool {
        let pair = match self.pair_store.get_by_symbol(&current.symbol).await {
            Ok(pair) => pair,
            Err(_) => return false,
        };
        let live_price = if chain.chain_type.is_sbs() { pair.sell_price } else { pair.buy_price };
        let drift = compare_percentage(action.swap_three.price, live_price).value() - 100.0;
        if chain.chain_type.is_sbs() {
            drift <= -0.15
        } else {
            drift >= 0.15
        }
    }

    /// Clears a leg's posted-order fields after an external
    /// cancellation/expiry is observed, so the next call reposts it,
    /// and invalidates the balance cache of the asset that would have
    /// been spent.
    async fn clear_leg_externally_canceled(&self, leg: LegIndex, action: &mut SwapAction) {
        let asset = self.leg_source_asset(leg, action);
        *action.leg_mut(leg) = LegState {
            symbol: action.leg(leg).symbol.clone(),
            price: action.leg(leg).price,
            ..Default::default()
        };
        if let Err(e) = self.action_store.update_swap_action(action).await {
            error!("failed to persist leg {leg:?} clear for swap action {}: {e}", action.id);
        }
        self.balance.invalidate_balance_cache(&asset).await;
    }

    /// Terminal failure of leg 1: no funds ever left `action.asset`, so
    /// the chain is simply abandoned.
    async fn cancel_leg_one_terminally(&self, action: &mut SwapAction, reason: &str) {
        warn!("swap action {}: canceling, {reason}", action.id);
        action.status = SwapActionStatus::Canceled;
        action.end_timestamp = Some(self.time.now_unix());
        action.end_quantity = Some(action.start_quantity);
        if let Err(e) = self.action_store.update_swap_action(action).await {
            error!("failed to persist leg 1 cancellation for swap action {}: {e}", action.id);
        }
        self.balance.invalidate_balance_cache(&action.asset).await;
    }

    /// Quantity to post for `leg`, clipped to the spendable balance of
    /// the asset that funds it (spec.md §4.2). Leg 1 needs no balance
    /// lookup: it always spends exactly `start_quantity`.
    async fn leg_quantity(&self, leg: LegIndex, chain: &SwapChain, action: &SwapAction, prev: Option<&ExchangeOrder>) -> Result<f64, SwapError> {
        match leg {
            LegIndex::One => Ok(action.start_quantity),
            LegIndex::Two => {
                let asset2 = self.asset2(action);
                let balance = self.balance.get_asset_balance(&asset2, false).await.map_err(|e| SwapError::Transient(e.to_string()))?;
                let prev = prev.expect("leg 2 requires leg 1's filled order");
                Ok(prev.cumulative_quote_qty.min(balance))
            }
            LegIndex::Three => {
                let asset3 = self.asset3(action);
                let balance = self.balance.get_asset_balance(&asset3, false).await.map_err(|e| SwapError::Transient(e.to_string()))?;
                let prev = prev.expect("leg 3 requires leg 2's filled order");
                let raw = if chain.chain_type.is_ssb() { prev.cumulative_quote_qty } else { prev.executed_qty };
                Ok(raw.min(balance))
            }
        }
    }

    /// The intermediate asset leg 1 converts into (leg 1's symbol minus
    /// the starting asset).
    fn asset2(&self, action: &SwapAction) -> String {
        strip_asset(&action.swap_one.symbol, &action.asset)
    }

    /// The intermediate asset leg 2 converts into (leg 2's symbol minus
    /// `asset2`).
    fn asset3(&self, action: &SwapAction) -> String {
        let asset2 = self.asset2(action);
        strip_asset(&action.swap_two.symbol, &asset2)
    }

    /// Which asset a cancellation/expiry at `leg` returns funds to, for
    /// cache invalidation purposes.
    fn leg_source_asset(&self, leg: LegIndex, action: &SwapAction) -> String {
        match leg {
            LegIndex::One => action.asset.clone(),
            LegIndex::Two => self.asset2(action),
            LegIndex::Three => self.asset3(action),
        }
    }

    /// Rollback at leg 2 (spec.md §4.3): abandon the chain and sell the
    /// intermediate asset straight back into the starting asset,
    /// stepping the sell price down tick by tick if the resting leg-2
    /// order at the midpoint price doesn't clear.
    async fn try_rollback_leg_two(&self, action: &mut SwapAction, chain: &SwapChain) -> Result<(), SwapError> {
        let leg1_symbol = action.swap_one.symbol.clone();
        let swap_one_qty = {
            let order_id = action.swap_one.external_id.ok_or_else(|| SwapError::RollbackInfeasible("leg 1 order id missing".into()))?;
            self.exchange
                .query_order(&leg1_symbol, order_id)
                .await
                .map_err(|e| SwapError::Transient(e.to_string()))?
                .cumulative_quote_qty
        };

        let pair1 = self.pair_store.get_by_symbol(&leg1_symbol).await.map_err(|e| SwapError::Transient(e.to_string()))?;
        let price = pair1.buy_price + pair1.min_price;
        let projected_end = format_quantity(&pair1, swap_one_qty / price);
        let projected_percent = compare_percentage(action.start_quantity, projected_end).value() - 100.0;
        if projected_percent < MIN_SALVAGE_PERCENT {
            return Err(SwapError::RollbackInfeasible(format!("percent too low: {projected_percent:.4}")));
        }

        let asset2 = self.asset2(action);
        let balance = self.balance.get_asset_balance(&asset2, false).await.map_err(|e| SwapError::Transient(e.to_string()))?;

        let leg2_order_id = action.swap_two.external_id.ok_or_else(|| SwapError::RollbackInfeasible("leg 2 order id missing".into()))?;
        self.exchange
            .cancel_order(&action.swap_two.symbol, leg2_order_id)
            .await
            .map_err(|e| SwapError::Transient(e.to_string()))?;

        for i in 1..=MAX_SALVAGE_ATTEMPTS {
            let pair1 = self.pair_store.get_by_symbol(&leg1_symbol).await.map_err(|e| SwapError::Transient(e.to_string()))?;
            let price = pair1.buy_price + pair1.min_price * i as f64;
            let quantity = swap_one_qty.min(balance);
            if quantity < pair1.min_notional {
                return Err(SwapError::RollbackInfeasible("below notional filter".into()));
            }

            let end_quantity = format_quantity(&pair1, quantity / price);
            let percent = compare_percentage(action.start_quantity, end_quantity).value() - 100.0;
            if percent < MIN_SALVAGE_PERCENT {
                return Err(SwapError::RollbackInfeasible(format!("percent too low: {percent:.4}")));
            }

            let placed = self
                .exchange
                .place_limit(&leg1_symbol, end_quantity, format_price(&pair1, price), Side::Buy, TimeInForce::Ioc)
                .await
                .map_err(|e| SwapError::Transient(e.to_string()))?;

            if !placed.is_filled() {
                self.time.sleep_seconds(5).await;
                continue;
            }

            action.swap_two = LegState {
                symbol: placed.symbol.clone(),
                price: placed.price,
                external_id: Some(placed.order_id),
                timestamp: Some(self.time.now_unix()),
                external_status: Some(format!("{}_RB", placed.status.as_str())),
            };
            action.end_quantity = Some(placed.executed_qty);
            action.end_timestamp = Some(self.time.now_unix());
            action.status = SwapActionStatus::Success;
            self.persist_terminal(action).await;
            info!("swap action {}: rolled back at leg 2", action.id);
            return Ok(());
        }

        Err(SwapError::RollbackInfeasible("exhausted rollback attempts".into()))
    }

    /// Force-swap at leg 3 (spec.md §4.4): abandon the resting leg-3
    /// order and immediately cross the spread to finish the chain,
    /// stepping price tick by tick if the first attempt doesn't clear.
    async fn try_force_swap_leg_three(&self, action: &mut SwapAction, chain: &SwapChain) -> Result<(), SwapError> {
        let leg3_symbol = action.swap_three.symbol.clone();
        let swap_two_order = {
            let order_id = action.swap_two.external_id.ok_or_else(|| SwapError::ForceSwapInfeasible("leg 2 order id missing".into()))?;
            self.exchange
                .query_order(&action.swap_two.symbol, order_id)
                .await
                .map_err(|e| SwapError::Transient(e.to_string()))?
        };

        let raw_quantity = if chain.chain_type.is_ssb() { swap_two_order.cumulative_quote_qty } else { swap_two_order.executed_qty };

        let pair3 = self.pair_store.get_by_symbol(&leg3_symbol).await.map_err(|e| SwapError::Transient(e.to_string()))?;
        let price = if chain.chain_type.is_sbs() { pair3.sell_price - pair3.min_price } else { pair3.buy_price + pair3.min_price };
        let projected_end = if chain.chain_type.is_sbs() { raw_quantity * price } else { raw_quantity / price };
        if projected_end <= 0.0 {
            return Err(SwapError::ForceSwapInfeasible("incorrect end quantity calculation".into()));
        }
        let projected_percent = compare_percentage(action.start_quantity, projected_end).value() - 100.0;
        if projected_percent < MIN_SALVAGE_PERCENT {
            return Err(SwapError::ForceSwapInfeasible(format!("percent too low: {projected_percent:.4}")));
        }

        let leg3_order_id = action.swap_three.external_id.ok_or_else(|| SwapError::ForceSwapInfeasible("leg 3 order id missing".into()))?;
        self.exchange
            .cancel_order(&leg3_symbol, leg3_order_id)
            .await
            .map_err(|e| SwapError::Transient(e.to_string()))?;

        let asset3 = self.asset3(action);
        let balance = self.balance.get_asset_balance(&asset3, false).await.map_err(|e| SwapError::Transient(e.to_string()))?;
        let quantity = raw_quantity.min(balance);

        for i in 1..=MAX_SALVAGE_ATTEMPTS {
            let pair3 = self.pair_store.get_by_symbol(&leg3_symbol).await.map_err(|e| SwapError::Transient(e.to_string()))?;
            let price = if chain.chain_type.is_sbs() {
                pair3.sell_price - pair3.min_price * i as f64
            } else {
                pair3.buy_price + pair3.min_price * i as f64
            };
            let projected_end = if chain.chain_type.is_sbs() { quantity } else { quantity / price };
            let percent = compare_percentage(action.start_quantity, projected_end).value() - 100.0;
            if percent < MIN_SALVAGE_PERCENT {
                return Err(SwapError::ForceSwapInfeasible(format!("percent too low: {percent:.4}")));
            }

            let side = if chain.chain_type.is_sbs() { Side::Sell } else { Side::Buy };
            let order_qty = if chain.chain_type.is_sbs() { quantity } else { quantity / price };
            let placed = self
                .exchange
                .place_limit(&leg3_symbol, format_quantity(&pair3, order_qty), format_price(&pair3, price), side, TimeInForce::Ioc)
                .await
                .map_err(|e| SwapError::Transient(e.to_string()))?;

            if !placed.is_filled() {
                self.time.sleep_seconds(5).await;
                continue;
            }

            let end_quantity = if chain.chain_type.is_sbs() { placed.cumulative_quote_qty } else { placed.executed_qty };
            action.swap_three = LegState {
                symbol: placed.symbol.clone(),
                price: placed.price,
                external_id: Some(placed.order_id),
                timestamp: Some(self.time.now_unix()),
                external_status: Some(format!("{}_FORCE", placed.status.as_str())),
            };
            action.end_quantity = Some(end_quantity);
            action.end_timestamp = Some(self.time.now_unix());
            action.status = SwapActionStatus::Success;
            self.persist_terminal(action).await;
            info!("swap action {}: force-swapped at leg 3", action.id);
            return Ok(());
        }

        Err(SwapError::ForceSwapInfeasible("exhausted force-swap attempts".into()))
    }
}

/// `"SOLGBP"` minus `"GBP"` is `"SOL"` — the same string-replace the
/// original source uses to derive the intermediate asset of a symbol.
fn strip_asset(symbol: &str, known_asset: &str) -> String {
    symbol.replace(known_asset, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::tests::FakeExchange;
    use crate::model::{ChainType, Order, SwapChain, SwapLeg};
    use crate::order_store::InMemoryOrderStore;
    use crate::swap_action_store::{InMemorySwapActionStore, InMemorySwapChainStore};
    use crate::swap_pair_store::InMemorySwapPairStore;
    use crate::time_source::FakeTimeSource;

    struct Harness {
        exec: SwapExecutor,
        exchange: Arc<FakeExchange>,
        actions: Arc<InMemorySwapActionStore>,
        chains: Arc<InMemorySwapChainStore>,
        orders: Arc<InMemoryOrderStore>,
        pairs: Arc<InMemorySwapPairStore>,
        time: Arc<FakeTimeSource>,
    }

    fn pair(symbol: &str, base: &str, quote: &str, buy: f64, sell: f64) -> crate::model::SwapPair {
        crate::model::SwapPair::new(symbol, base, quote, buy, sell, 0, 5.0, 0.0001, 0.01)
    }

    fn harness() -> Harness {
        let exchange = Arc::new(FakeExchange::new());
        let time = Arc::new(FakeTimeSource::new(1_000_000));
        let actions = Arc::new(InMemorySwapActionStore::new());
        let chains = Arc::new(InMemorySwapChainStore::new());
        let pairs = Arc::new(InMemorySwapPairStore::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        let balance = Arc::new(BalanceService::new(exchange.clone()));

        let exec = SwapExecutor::new(
            exchange.clone(),
            time.clone(),
            actions.clone(),
            chains.clone(),
            pairs.clone(),
            orders.clone(),
            balance,
        );

        Harness { exec, exchange, actions, chains, orders, pairs, time }
    }

    fn base_order(id: i64) -> Order {
        Order { id, symbol: "SOLUSDT".into(), swap: true, price: 0.0, quantity: 0.0, executed_quantity: 0.0, operation: Side::Sell }
    }

    fn pending_action(order_id: i64, chain_id: i64, asset: &str, start_quantity: f64, start_ts: i64) -> SwapAction {
        SwapAction {
            id: order_id,
            order_id,
            swap_chain_id: chain_id,
            asset: asset.into(),
            status: SwapActionStatus::Pending,
            start_timestamp: start_ts,
            end_timestamp: None,
            start_quantity,
            end_quantity: None,
            // SSB: leg 1 sells SOL for USDT, leg 2 sells that USDT for
            // GBP, leg 3 buys SOL back with the GBP.
            swap_one: LegState { symbol: "SOLUSDT".into(), price: 100.0, ..Default::default() },
            swap_two: LegState { symbol: "USDTGBP".into(), price: 0.79, ..Default::default() },
            swap_three: LegState { symbol: "SOLGBP".into(), price: 58.6, ..Default::default() },
        }
    }

    fn ssb_chain(id: i64) -> SwapChain {
        SwapChain {
            id,
            chain_type: ChainType::Ssb,
            swap_one: SwapLeg { symbol: "SOLUSDT".into(), base_asset: "SOL".into(), quote_asset: "USDT".into(), price: 100.0 },
            swap_two: SwapLeg { symbol: "USDTGBP".into(), base_asset: "USDT".into(), quote_asset: "GBP".into(), price: 0.79 },
            swap_three: SwapLeg { symbol: "SOLGBP".into(), base_asset: "SOL".into(), quote_asset: "GBP".into(), price: 58.6 },
            predicted_percent: 104.7,
        }
    }

    fn setup_pairs(h: &Harness) {
        h.pairs.set(pair("SOLUSDT", "SOL", "USDT", 99.0, 100.0));
        h.pairs.set(pair("SOLGBP", "SOL", "GBP", 58.5, 58.6));
        h.pairs.set(pair("USDTGBP", "USDT", "GBP", 0.78, 0.79));
    }

    #[tokio::test]
    async fn happy_path_completes_all_three_legs() {
        let h = harness();
        setup_pairs(&h);
        h.exchange.set_balance("SOL", 1_000.0);
        h.exchange.set_balance("USDT", 1_000_000.0);
        h.exchange.set_balance("GBP", 1_000_000.0);
        h.chains.insert(ssb_chain(7));
        h.actions.insert(pending_action(1, 7, "SOL", 100.0, h.time.now_unix()));
        h.orders.insert(base_order(1));

        let outcome = h.exec.execute(base_order(1)).await;
        assert_eq!(outcome, ExecuteOutcome::Pending);
        let leg1_id = h.actions.get(1).unwrap().swap_one.external_id.expect("leg 1 posted");
        // Sold 100 SOL for 10,000 USDT.
        h.exchange.set_order_status("SOLUSDT", leg1_id, crate::model::OrderStatus::Filled, 100.0, 10_000.0);

        let outcome = h.exec.execute(base_order(1)).await;
        assert_eq!(outcome, ExecuteOutcome::Pending);
        let leg2_id = h.actions.get(1).unwrap().swap_two.external_id.expect("leg 2 posted");
        // Sold 10,000 USDT for 7,900 GBP.
        h.exchange.set_order_status("USDTGBP", leg2_id, crate::model::OrderStatus::Filled, 10_000.0, 7_900.0);

        let outcome = h.exec.execute(base_order(1)).await;
        assert_eq!(outcome, ExecuteOutcome::Pending);
        let leg3_id = h.actions.get(1).unwrap().swap_three.external_id.expect("leg 3 posted");
        // Bought 134.8 SOL with the 7,900 GBP.
        h.exchange.set_order_status("SOLGBP", leg3_id, crate::model::OrderStatus::Filled, 134.8, 7_900.0);

        let outcome = h.exec.execute(base_order(1)).await;
        assert_eq!(outcome, ExecuteOutcome::Terminated(SwapActionStatus::Success));
        let done = h.actions.get(1).unwrap();
        assert_eq!(done.status, SwapActionStatus::Success);
        assert!(done.end_quantity.unwrap() > 100.0);
        assert!(!h.orders.get(1).await.unwrap().swap);
    }

    #[tokio::test]
    async fn no_active_action_clears_swap_flag_and_returns() {
        let h = harness();
        h.orders.insert(base_order(9));
        let outcome = h.exec.execute(base_order(9)).await;
        assert_eq!(outcome, ExecuteOutcome::NoActiveAction);
        assert!(!h.orders.get(9).await.unwrap().swap);
    }

    #[tokio::test]
    async fn leg_one_post_failure_cancels_terminally() {
        let h = harness();
        setup_pairs(&h);
        h.chains.insert(ssb_chain(1));
        h.actions.insert(pending_action(2, 1, "SOL", 50.0, h.time.now_unix()));
        h.orders.insert(base_order(2));
        *h.exchange.fail_next_place.lock().unwrap() = true;

        let outcome = h.exec.execute(base_order(2)).await;
        assert_eq!(outcome, ExecuteOutcome::Pending);
        let action = h.actions.get(2).unwrap();
        assert_eq!(action.status, SwapActionStatus::Canceled);
        assert_eq!(action.end_quantity, Some(50.0));
    }

    #[tokio::test]
    async fn leg_two_deadline_triggers_rollback() {
        let h = harness();
        setup_pairs(&h);
        h.exchange.set_balance("SOL", 1_000.0);
        h.exchange.set_balance("USDT", 1_000_000.0);
        h.chains.insert(ssb_chain(3));
        let start_ts = h.time.now_unix();
        h.actions.insert(pending_action(4, 3, "SOL", 100.0, start_ts));
        h.orders.insert(base_order(4));

        // Leg 1 fills immediately, selling 100 SOL for ~10000 USDT.
        h.exec.execute(base_order(4)).await;
        let leg1_id = h.actions.get(4).unwrap().swap_one.external_id.unwrap();
        h.exchange.set_order_status("SOLUSDT", leg1_id, crate::model::OrderStatus::Filled, 100.0, 10_000.0);

        // Leg 2 posts but never fills; push the clock past the 5 minute deadline.
        h.exec.execute(base_order(4)).await;
        h.time.advance_minutes(6);

        let outcome = h.exec.execute(base_order(4)).await;
        assert_eq!(outcome, ExecuteOutcome::Pending);
        let action = h.actions.get(4).unwrap();
        assert_eq!(action.status, SwapActionStatus::Success);
        assert!(action.swap_two.external_status.as_deref().unwrap().ends_with("_RB"));
    }

    #[test]
    fn strip_asset_removes_known_asset() {
        assert_eq!(strip_asset("SOLGBP", "GBP"), "SOL");
        assert_eq!(strip_asset("SOLUSDT", "SOL"), "USDT");
    }

    #[tokio::test]
    async fn leg_two_external_cancellation_preserves_price_on_repost() {
        let h = harness();
        setup_pairs(&h);
        h.exchange.set_balance("SOL", 1_000.0);
        h.exchange.set_balance("USDT", 1_000_000.0);
        h.chains.insert(ssb_chain(20));
        h.actions.insert(pending_action(21, 20, "SOL", 100.0, h.time.now_unix()));
        h.orders.insert(base_order(21));

        // Leg 1 fills, leg 2 posts resting at its 0.79 price.
        h.exec.execute(base_order(21)).await;
        let leg1_id = h.actions.get(21).unwrap().swap_one.external_id.unwrap();
        h.exchange.set_order_status("SOLUSDT", leg1_id, crate::model::OrderStatus::Filled, 100.0, 10_000.0);
        h.exec.execute(base_order(21)).await;
        let leg2_id = h.actions.get(21).unwrap().swap_two.external_id.unwrap();
        assert_eq!(h.actions.get(21).unwrap().swap_two.price, 0.79);

        // Leg 2's resting order is canceled externally (not by a rollback).
        h.exchange.set_order_status("USDTGBP", leg2_id, crate::model::OrderStatus::Canceled, 0.0, 0.0);
        let outcome = h.exec.execute(base_order(21)).await;
        assert_eq!(outcome, ExecuteOutcome::Pending);
        let cleared = h.actions.get(21).unwrap();
        assert!(cleared.swap_two.external_id.is_none());
        assert!(cleared.swap_two.external_status.is_none());
        assert_eq!(cleared.swap_two.price, 0.79, "clearing an externally-canceled leg must not zero its price");

        // The repost must use the preserved price, not format_price's min_price clamp.
        h.exec.execute(base_order(21)).await;
        let reposted_id = h.actions.get(21).unwrap().swap_two.external_id.expect("leg 2 reposted");
        let reposted = h.exchange.query_order("USDTGBP", reposted_id).await.unwrap();
        assert!((reposted.price - 0.79).abs() < 0.001, "expected repost near 0.79, got {}", reposted.price);
    }

    #[tokio::test]
    async fn leg_three_long_tail_accepts_near_complete_partial_fill() {
        let h = harness();
        setup_pairs(&h);
        h.exchange.set_balance("SOL", 1_000.0);
        h.exchange.set_balance("USDT", 1_000_000.0);
        h.exchange.set_balance("GBP", 1_000_000.0);
        h.chains.insert(ssb_chain(30));
        let start_ts = h.time.now_unix();
        h.actions.insert(pending_action(31, 30, "SOL", 100.0, start_ts));
        h.orders.insert(base_order(31));

        h.exec.execute(base_order(31)).await;
        let leg1_id = h.actions.get(31).unwrap().swap_one.external_id.unwrap();
        h.exchange.set_order_status("SOLUSDT", leg1_id, crate::model::OrderStatus::Filled, 100.0, 10_000.0);
        h.exec.execute(base_order(31)).await;
        let leg2_id = h.actions.get(31).unwrap().swap_two.external_id.unwrap();
        h.exchange.set_order_status("USDTGBP", leg2_id, crate::model::OrderStatus::Filled, 10_000.0, 7_900.0);
        h.exec.execute(base_order(31)).await;
        let leg3_id = h.actions.get(31).unwrap().swap_three.external_id.unwrap();

        let posted = h.exchange.query_order("SOLGBP", leg3_id).await.unwrap();
        let near_complete = posted.orig_qty * 0.99;
        h.exchange.set_order_status("SOLGBP", leg3_id, crate::model::OrderStatus::PartiallyFilled, near_complete, near_complete * 58.6);
        h.time.advance_minutes(241);

        let outcome = h.exec.execute(base_order(31)).await;
        assert_eq!(outcome, ExecuteOutcome::Terminated(SwapActionStatus::Success));
        let action = h.actions.get(31).unwrap();
        assert_eq!(action.end_quantity, Some(near_complete));
    }

    #[tokio::test]
    async fn leg_three_force_swap_completes_on_unfavorable_price_drift() {
        let h = harness();
        setup_pairs(&h);
        h.exchange.set_balance("SOL", 1_000.0);
        h.exchange.set_balance("USDT", 1_000_000.0);
        h.exchange.set_balance("GBP", 1_000_000.0);
        h.chains.insert(ssb_chain(40));
        h.actions.insert(pending_action(41, 40, "SOL", 100.0, h.time.now_unix()));
        h.orders.insert(base_order(41));

        h.exec.execute(base_order(41)).await;
        let leg1_id = h.actions.get(41).unwrap().swap_one.external_id.unwrap();
        h.exchange.set_order_status("SOLUSDT", leg1_id, crate::model::OrderStatus::Filled, 100.0, 10_000.0);
        h.exec.execute(base_order(41)).await;
        let leg2_id = h.actions.get(41).unwrap().swap_two.external_id.unwrap();
        h.exchange.set_order_status("USDTGBP", leg2_id, crate::model::OrderStatus::Filled, 10_000.0, 7_900.0);
        h.exec.execute(base_order(41)).await;

        // Leg 3 never fills; the quote moves against the resting order
        // enough to trip the 0.15% drift check without waiting for the
        // 10 minute deadline.
        h.pairs.set(pair("SOLGBP", "SOL", "GBP", 59.0, 58.6));

        let outcome = h.exec.execute(base_order(41)).await;
        assert_eq!(outcome, ExecuteOutcome::Pending);
        let action = h.actions.get(41).unwrap();
        assert_eq!(action.status, SwapActionStatus::Success);
        assert!(action.swap_three.external_status.as_deref().unwrap().ends_with("_FORCE"));
        assert!(action.end_quantity.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn leg_two_rollback_infeasible_when_percent_too_low() {
        let h = harness();
        h.pairs.set(pair("SOLUSDT", "SOL", "USDT", 500.0, 100.0));
        h.pairs.set(pair("SOLGBP", "SOL", "GBP", 58.5, 58.6));
        h.pairs.set(pair("USDTGBP", "USDT", "GBP", 0.78, 0.79));
        h.exchange.set_balance("SOL", 1_000.0);
        h.exchange.set_balance("USDT", 1_000_000.0);
        h.chains.insert(ssb_chain(50));
        let start_ts = h.time.now_unix();
        h.actions.insert(pending_action(51, 50, "SOL", 100.0, start_ts));
        h.orders.insert(base_order(51));

        h.exec.execute(base_order(51)).await;
        let leg1_id = h.actions.get(51).unwrap().swap_one.external_id.unwrap();
        h.exchange.set_order_status("SOLUSDT", leg1_id, crate::model::OrderStatus::Filled, 100.0, 10_000.0);

        h.exec.execute(base_order(51)).await;
        h.time.advance_minutes(6);

        let outcome = h.exec.execute(base_order(51)).await;
        assert_eq!(outcome, ExecuteOutcome::Pending);
        let action = h.actions.get(51).unwrap();
        assert_eq!(action.status, SwapActionStatus::Process, "a rollback this unprofitable must not complete the chain");
        assert_eq!(action.swap_two.external_status.as_deref(), Some("NEW"), "leg 2's resting order must be left untouched");
    }
}
