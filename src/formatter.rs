//! Pure price/quantity rounding against an exchange pair's tick/step
//! (spec.md §4.5). Grounded line-for-line on
//! `exchange_context/service/formatter.go`.

use crate::model::{Percent, SwapPair};

/// Number of digits after the decimal point in `value`'s shortest
/// round-trip decimal representation. Mirrors the Go original's
/// `strconv.FormatFloat(v, 'f', -1, 64)` + string split on `.`.
fn fractional_digits(value: f64) -> usize {
    let formatted = format!("{value}");
    match formatted.split_once('.') {
        Some((_, frac)) => frac.len(),
        None => 0,
    }
}

/// Rounds `price` to the decimal precision implied by `pair.min_price`'s
/// fractional-digit count. Prices below the tick floor clamp to it.
pub fn format_price(pair: &SwapPair, price: f64) -> f64 {
    if price < pair.min_price {
        return pair.min_price;
    }
    let precision = fractional_digits(pair.min_price);
    let ratio = 10f64.powi(precision as i32);
    (price * ratio).round() / ratio
}

/// Truncates (never rounds) `quantity` to the fractional-digit count
/// implied by `pair.min_quantity`. Truncation is essential: rounding up
/// could exceed available balance and get the order rejected.
pub fn format_quantity(pair: &SwapPair, quantity: f64) -> f64 {
    if quantity < pair.min_quantity {
        return pair.min_quantity;
    }

    let precision = fractional_digits(pair.min_quantity);
    let formatted = format!("{quantity}");
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, ""));

    if precision == 0 || frac_part.is_empty() {
        return int_part.parse().unwrap_or(quantity);
    }

    let take = precision.min(frac_part.len());
    let truncated = format!("{int_part}.{}", &frac_part[..take]);
    truncated.parse().unwrap_or(quantity)
}

/// A plain ratio, not a delta: `second * 100 / first`. Callers
/// throughout the executor subtract 100 to get a signed percent.
pub fn compare_percentage(first: f64, second: f64) -> Percent {
    Percent(second * 100.0 / first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(min_price: f64, min_quantity: f64) -> SwapPair {
        SwapPair::new("SOLGBP", "SOL", "GBP", 58.56, 58.60, 0, 10.0, min_quantity, min_price)
    }

    #[test]
    fn format_price_clamps_below_tick() {
        let p = pair(0.01, 0.0001);
        assert_eq!(format_price(&p, 0.001), 0.01);
    }

    #[test]
    fn format_price_rounds_to_tick_precision() {
        let p = pair(0.01, 0.0001);
        assert_eq!(format_price(&p, 58.563), 58.56);
    }

    #[test]
    fn format_price_survives_idempotently() {
        let p = pair(0.01, 0.0001);
        let once = format_price(&p, 57.389);
        let twice = format_price(&p, once);
        assert_eq!(once, twice);
    }

    #[test]
    fn format_price_aligned_value_unchanged() {
        let p = pair(0.01, 0.0001);
        assert_eq!(format_price(&p, 57.39), 57.39);
    }

    #[test]
    fn format_quantity_truncates_not_rounds() {
        // spec.md §8 scenario 6.
        let p = pair(0.01, 0.0001);
        assert_eq!(format_quantity(&p, 0.00019999), 0.0001);
    }

    #[test]
    fn format_quantity_clamps_below_min() {
        let p = pair(0.01, 0.0001);
        assert_eq!(format_quantity(&p, 0.00001), 0.0001);
    }

    #[test]
    fn format_quantity_is_idempotent() {
        let p = pair(0.01, 0.0001);
        let once = format_quantity(&p, 102.0345678);
        let twice = format_quantity(&p, once);
        assert_eq!(once, twice);
    }

    #[test]
    fn compare_percentage_is_a_ratio_not_a_delta() {
        let pct = compare_percentage(100.0, 104.755);
        assert!((pct.value() - 104.755).abs() < 1e-9);
    }
}
