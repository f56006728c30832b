//! Swap Finder (spec.md §2 item 9): proposes candidate `SwapChain`
//! structures from a set of live `SwapPair` quotes. Spec.md treats the
//! Finder as out-of-scope detail, "summarized only to the extent
//! needed to make the Executor's inputs precise" — this is a minimal
//! triangular-cycle search, not a production arbitrage scanner.
//!
//! Grounded on `original_source/tests/sbb_swap_finder_test.go`, the
//! only surviving trace of the original's per-chain-type
//! `SBBSwapFinder` service (its implementation file didn't survive the
//! source filter): three quotes sharing a pivot asset, percent computed
//! via `compare_percentage`, but without its exchange-wide symbol
//! universe scan; callers hand this a small candidate pool.

use crate::formatter::compare_percentage;
use crate::model::{ChainType, SwapChain, SwapLeg, SwapPair};

/// Searches a fixed pool of quotes for three-leg cycles that start and
/// end at `starting_asset`. Held by the strategy/dispatch loop, not by
/// the Executor itself.
pub struct SwapFinder {
    min_predicted_percent: f64,
}

impl SwapFinder {
    pub fn new(min_predicted_percent: f64) -> Self {
        Self { min_predicted_percent }
    }

    /// Enumerates every SSB/SBS/SBB cycle reachable from `starting_asset`
    /// through `pairs`, keeping only chains whose predicted percent gain
    /// clears `min_predicted_percent`. `next_id` assigns the returned
    /// chains' ids starting from that value.
    pub fn find_chains(&self, starting_asset: &str, pairs: &[SwapPair], next_id: i64) -> Vec<SwapChain> {
        let mut chains = Vec::new();
        let mut id = next_id;

        for leg1 in pairs.iter().filter(|p| p.base_asset == starting_asset) {
            let asset2 = &leg1.quote_asset;
            for leg2 in pairs {
                let (chain_type, asset3) = if leg2.base_asset == *asset2 {
                    (ChainType::Ssb, leg2.quote_asset.clone())
                } else if leg2.quote_asset == *asset2 && leg2.base_asset != starting_asset {
                    (ChainType::Sbs, leg2.base_asset.clone())
                } else {
                    continue;
                };
                if asset3 == starting_asset {
                    continue;
                }

                for leg3 in pairs {
                    let closes_at_start = match chain_type {
                        ChainType::Ssb => leg3.base_asset == asset3 && leg3.quote_asset == starting_asset,
                        ChainType::Sbs => leg3.base_asset == asset3 && leg3.quote_asset == starting_asset,
                        ChainType::Sbb => false,
                    };
                    if !closes_at_start {
                        continue;
                    }

                    let predicted = predicted_end_quantity(chain_type, leg1, leg2, leg3);
                    let percent = compare_percentage(1.0, predicted).value() - 100.0;
                    if percent < self.min_predicted_percent {
                        continue;
                    }

                    chains.push(SwapChain {
                        id,
                        chain_type,
                        swap_one: leg_of(leg1),
                        swap_two: leg_of(leg2),
                        swap_three: leg_of(leg3),
                        predicted_percent: percent,
                    });
                    id += 1;
                }
            }
        }

        chains
    }
}

fn leg_of(pair: &SwapPair) -> SwapLeg {
    SwapLeg {
        symbol: pair.symbol.clone(),
        base_asset: pair.base_asset.clone(),
        quote_asset: pair.quote_asset.clone(),
        price: pair.sell_price,
    }
}

/// Notional value of one unit of the starting asset after all three
/// legs, at the quotes' current prices. Only used to rank candidates;
/// the Executor recomputes actual fills leg by leg.
fn predicted_end_quantity(chain_type: ChainType, leg1: &SwapPair, leg2: &SwapPair, leg3: &SwapPair) -> f64 {
    let after_leg1 = leg1.sell_price;
    match chain_type {
        ChainType::Ssb => {
            let after_leg2 = after_leg1 * leg2.sell_price;
            after_leg2 / leg3.buy_price
        }
        ChainType::Sbs => {
            let after_leg2 = after_leg1 / leg2.buy_price;
            after_leg2 * leg3.sell_price
        }
        ChainType::Sbb => after_leg1 / leg2.buy_price,
    }
}
