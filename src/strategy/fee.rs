//! Volatility-driven fee re-pricing.
//!
//! `optimal = clamp(base_fee + trunc(volatility * multiplier), min_fee, max_fee)`,
//! applied only when it moves more than the hysteresis threshold away from
//! the current fee.

use rust_decimal::Decimal;

use crate::types::clamp_fee;

/// Target fee for the observed volatility.
pub fn optimal_fee(volatility: Decimal, base_fee: u32, multiplier: Decimal, min_fee: u32, max_fee: u32) -> u32 {
    let adjustment = volatility.saturating_mul(multiplier).trunc();
    clamp_fee(Decimal::from(base_fee).saturating_add(adjustment), min_fee, max_fee)
}

/// Hysteresis check: strictly more than `threshold` away.
pub fn needs_update(current_fee: u32, optimal: u32, threshold: u32) -> bool {
    current_fee.abs_diff(optimal) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_optimal_fee_adds_volatility_adjustment() {
        assert_eq!(optimal_fee(dec!(0.02), 3000, dec!(10000), 500, 10_000), 3200);
        assert_eq!(optimal_fee(dec!(0.005), 3000, dec!(10000), 500, 10_000), 3050);
        // truncated, not rounded
        assert_eq!(optimal_fee(dec!(0.00999), 3000, dec!(10000), 500, 10_000), 3099);
    }

    #[test]
    fn test_optimal_fee_is_clamped() {
        assert_eq!(optimal_fee(dec!(5), 3000, dec!(10000), 500, 10_000), 10_000);
        assert_eq!(optimal_fee(dec!(-1), 3000, dec!(10000), 500, 10_000), 500);
    }

    #[test]
    fn test_optimal_fee_saturates_on_extreme_volatility() {
        let huge = dec!(10_000_000_000_000_000_000_000_000);
        assert_eq!(optimal_fee(huge, 3000, dec!(10000), 500, 10_000), 10_000);
        assert_eq!(optimal_fee(-huge, 3000, dec!(10000), 500, 10_000), 500);
        assert_eq!(optimal_fee(Decimal::MAX, 3000, Decimal::MAX, 500, 10_000), 10_000);
    }

    #[test]
    fn test_optimal_fee_stays_in_bounds_across_inputs() {
        let vols = [dec!(-10), dec!(-0.3), dec!(0), dec!(0.0001), dec!(0.02), dec!(0.5), dec!(3), dec!(1000)];
        let bases = [0u32, 500, 3000, 10_000, 50_000];
        for vol in vols {
            for base in bases {
                let fee = optimal_fee(vol, base, dec!(10000), 500, 10_000);
                assert!((500..=10_000).contains(&fee), "fee {fee} for vol {vol} base {base}");
            }
        }
    }

    #[test]
    fn test_needs_update_is_strict() {
        assert!(!needs_update(3000, 3050, 100));
        assert!(!needs_update(3000, 3100, 100));
        assert!(needs_update(3000, 3101, 100));
        assert!(needs_update(3200, 3000, 100));
        assert!(!needs_update(3000, 3000, 0));
    }
}
