//! Decision engine: auction state + profitability estimate → one action.
//!
//! `decide` is a pure function. Bidding is evaluated strictly before fee
//! re-pricing, so an operator that can profitably outbid the standing rent
//! (its own included) bids and leaves the fee alone for that cycle.

pub mod bid;
pub mod fee;

use alloy::primitives::Address;
use rust_decimal::Decimal;
use std::fmt;

use crate::types::{short_address, Action, AuctionState, ExpectedProfit, PendingBid, Wei};
use bid::{evaluate_bid, BidEvaluation, BidVerdict};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Everything `decide` needs besides the observed state and the estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionParams {
    /// Our own address; fee re-pricing applies only while we manage the pool.
    pub operator: Address,
    /// Share of expected profit we are willing to pay as rent (0.8 = 80%).
    pub bid_fraction: Decimal,
    /// Expected profit per block must be strictly above this to bid.
    pub min_profit_threshold: Wei,
    /// Scales volatility into hundredths of a basis point.
    pub fee_volatility_multiplier: Decimal,
    /// Re-price only when the optimal fee moves more than this.
    pub fee_update_threshold: u32,
    pub min_bid_increment: Wei,
    pub max_fee: u32,
    pub min_fee: u32,
    pub base_fee: u32,
}

impl DecisionParams {
    /// Defaults for a given operator: 80% bid fraction, 0.001 ETH profit
    /// floor, 3000 base fee within [500, 10000], 100 hysteresis.
    pub fn for_operator(operator: Address) -> Self {
        Self {
            operator,
            bid_fraction: Decimal::new(8, 1),
            min_profit_threshold: Decimal::from(1_000_000_000_000_000u64),
            fee_volatility_multiplier: Decimal::from(10_000),
            fee_update_threshold: 100,
            min_bid_increment: Decimal::from(100),
            max_fee: 10_000,
            min_fee: 500,
            base_fee: 3000,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Why a cycle chose its action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionRecord {
    /// Expected profit supports outbidding the highest standing rent.
    Outbid { bid: BidEvaluation },
    /// We manage the pool and the optimal fee drifted past the threshold.
    Reprice {
        bid: BidEvaluation,
        current_fee: u32,
        optimal_fee: u32,
    },
    /// We manage the pool and the fee is close enough to optimal.
    FeeHeld {
        bid: BidEvaluation,
        current_fee: u32,
        optimal_fee: u32,
    },
    /// No profitable bid and not the manager.
    Observe { bid: BidEvaluation },
}

impl DecisionRecord {
    pub fn action(&self) -> Action {
        match self {
            DecisionRecord::Outbid { bid } => Action::SubmitBid {
                rent_per_block: bid.affordable,
            },
            DecisionRecord::Reprice { optimal_fee, .. } => Action::SetFee { fee: *optimal_fee },
            DecisionRecord::FeeHeld { .. } | DecisionRecord::Observe { .. } => Action::NoAction,
        }
    }

    pub fn bid(&self) -> &BidEvaluation {
        match self {
            DecisionRecord::Outbid { bid }
            | DecisionRecord::Reprice { bid, .. }
            | DecisionRecord::FeeHeld { bid, .. }
            | DecisionRecord::Observe { bid } => bid,
        }
    }

    /// Short label for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            DecisionRecord::Outbid { .. } => "outbid",
            DecisionRecord::Reprice { .. } => "reprice",
            DecisionRecord::FeeHeld { .. } => "fee_held",
            DecisionRecord::Observe { bid } => match bid.verdict {
                BidVerdict::BelowProfitThreshold => "below_profit_threshold",
                _ => "outpriced",
            },
        }
    }
}

impl fmt::Display for DecisionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionRecord::Outbid { bid } => write!(
                f,
                "bid {} wei/block (required {}, highest {})",
                bid.affordable, bid.required, bid.highest
            ),
            DecisionRecord::Reprice {
                current_fee,
                optimal_fee,
                ..
            } => write!(f, "re-price fee {current_fee} -> {optimal_fee}"),
            DecisionRecord::FeeHeld {
                current_fee,
                optimal_fee,
                ..
            } => write!(f, "hold fee {current_fee} (optimal {optimal_fee})"),
            DecisionRecord::Observe { bid } => write!(
                f,
                "observe: {} (affordable {} vs required {})",
                self.reason(),
                bid.affordable,
                bid.required
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Evaluate the cycle and return the full reasoning.
pub fn explain(
    state: &AuctionState,
    pending: Option<&PendingBid>,
    estimate: &ExpectedProfit,
    params: &DecisionParams,
) -> DecisionRecord {
    let bid = evaluate_bid(
        state,
        pending,
        estimate,
        params.bid_fraction,
        params.min_profit_threshold,
        params.min_bid_increment,
    );

    if bid.verdict == BidVerdict::Bid {
        return DecisionRecord::Outbid { bid };
    }

    if state.is_managed_by(&params.operator) {
        let optimal = fee::optimal_fee(
            estimate.volatility,
            params.base_fee,
            params.fee_volatility_multiplier,
            params.min_fee,
            params.max_fee,
        );
        let current_fee = state.current_fee;
        return if fee::needs_update(current_fee, optimal, params.fee_update_threshold) {
            DecisionRecord::Reprice {
                bid,
                current_fee,
                optimal_fee: optimal,
            }
        } else {
            DecisionRecord::FeeHeld {
                bid,
                current_fee,
                optimal_fee: optimal,
            }
        };
    }

    DecisionRecord::Observe { bid }
}

/// Pure decision: what to do this cycle.
pub fn decide(
    state: &AuctionState,
    pending: Option<&PendingBid>,
    estimate: &ExpectedProfit,
    params: &DecisionParams,
) -> Action {
    explain(state, pending, estimate, params).action()
}

/// Log-friendly description of who currently manages the pool relative to us.
pub fn manager_role(state: &AuctionState, operator: &Address) -> String {
    match &state.current_manager {
        Some(m) if m == operator => "self".to_string(),
        Some(m) => short_address(m),
        None => "none".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
