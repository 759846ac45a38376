//! Bid evaluation.
//!
//! Decides whether the expected profit justifies outbidding the highest
//! standing rent, and by how much.

use rust_decimal::Decimal;

use crate::types::{highest_rent, AuctionState, ExpectedProfit, PendingBid, Wei};

/// Inputs and verdict of a bid evaluation, kept for the decision log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidEvaluation {
    /// Max of the active rent and the pending bid's rent.
    pub highest: Wei,
    /// `floor(profit * bid_fraction)`.
    pub affordable: Wei,
    /// `highest + min_bid_increment`.
    pub required: Wei,
    pub verdict: BidVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidVerdict {
    /// Bid `affordable`.
    Bid,
    /// Profit does not clear the minimum threshold.
    BelowProfitThreshold,
    /// The affordable rent cannot beat the required rent.
    Outpriced,
}

/// Evaluate a bid against the current and pending rent.
///
/// Profit must be strictly above `min_profit_threshold` and the affordable
/// rent must reach the required rent. Non-positive profit therefore never
/// bids as long as the threshold is non-negative.
pub fn evaluate_bid(
    state: &AuctionState,
    pending: Option<&PendingBid>,
    estimate: &ExpectedProfit,
    bid_fraction: Decimal,
    min_profit_threshold: Wei,
    min_bid_increment: Wei,
) -> BidEvaluation {
    let highest = highest_rent(state, pending);
    let affordable = estimate.profit_per_block.saturating_mul(bid_fraction).floor();
    let required = highest.saturating_add(min_bid_increment);

    let verdict = if estimate.profit_per_block <= min_profit_threshold.max(Decimal::ZERO) {
        BidVerdict::BelowProfitThreshold
    } else if affordable < required || affordable <= Decimal::ZERO {
        BidVerdict::Outpriced
    } else {
        BidVerdict::Bid
    };

    BidEvaluation {
        highest,
        affordable,
        required,
        verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use rust_decimal_macros::dec;

    const FINNEY: Decimal = dec!(1_000_000_000_000_000);

    fn state(rent: Wei) -> AuctionState {
        AuctionState {
            current_manager: Some(Address::repeat_byte(9)),
            rent_per_block: rent,
            ..AuctionState::unmanaged(3000)
        }
    }

    fn eval(state: &AuctionState, pending: Option<&PendingBid>, profit: Wei) -> BidEvaluation {
        evaluate_bid(
            state,
            pending,
            &ExpectedProfit::new(profit, dec!(0.02)),
            dec!(0.8),
            FINNEY,
            dec!(100),
        )
    }

    #[test]
    fn test_bid_when_affordable_clears_required() {
        let out = eval(&state(FINNEY), None, dec!(15) * FINNEY);
        assert_eq!(out.verdict, BidVerdict::Bid);
        assert_eq!(out.affordable, dec!(12) * FINNEY);
        assert_eq!(out.required, FINNEY + dec!(100));
    }

    #[test]
    fn test_pending_bid_raises_the_bar() {
        let pending = PendingBid {
            bidder: Address::repeat_byte(3),
            rent_per_block: dec!(12) * FINNEY,
            deposit: dec!(1200) * FINNEY,
            activation_block: 10,
            timestamp: 0,
        };
        let out = eval(&state(FINNEY), Some(&pending), dec!(15) * FINNEY);
        assert_eq!(out.highest, dec!(12) * FINNEY);
        assert_eq!(out.verdict, BidVerdict::Outpriced);
    }

    #[test]
    fn test_profit_at_threshold_does_not_bid() {
        let out = eval(&AuctionState::unmanaged(3000), None, FINNEY);
        assert_eq!(out.verdict, BidVerdict::BelowProfitThreshold);
    }

    #[test]
    fn test_negative_profit_never_bids_even_with_zero_threshold() {
        let out = evaluate_bid(
            &AuctionState::unmanaged(3000),
            None,
            &ExpectedProfit::new(dec!(-500), Decimal::ZERO),
            dec!(0.8),
            Decimal::ZERO,
            dec!(100),
        );
        assert_eq!(out.verdict, BidVerdict::BelowProfitThreshold);
    }

    #[test]
    fn test_affordable_is_floored_to_whole_wei() {
        let out = evaluate_bid(
            &AuctionState::unmanaged(3000),
            None,
            &ExpectedProfit::new(dec!(1001), Decimal::ZERO),
            dec!(0.8),
            dec!(10),
            dec!(100),
        );
        assert_eq!(out.affordable, dec!(800));
        assert_eq!(out.verdict, BidVerdict::Bid);
    }
}
