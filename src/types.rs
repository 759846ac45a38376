//! Shared types for the auction operator.
//!
//! The auction data model (state, pending bid, history) and the pure
//! checks for the auction invariants live here so that the reader,
//! strategy, and executor can depend on them without depending on
//! each other. Nothing in this module performs I/O.
//!
//! Monetary amounts are [`Wei`]: a `Decimal` that always holds an integer
//! number of wei. Fees are in hundredths of a basis point (3000 = 0.30%).

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AgentError;

/// Integer amount in the chain's minimal unit.
pub type Wei = Decimal;

const WEI_PER_ETH: Decimal = dec!(1_000_000_000_000_000_000);

/// Convert wei to ETH for display.
pub fn wei_to_eth(amount: Wei) -> Decimal {
    amount / WEI_PER_ETH
}

/// Shorten an address for log lines: `0x1234...abcd`.
pub fn short_address(addr: &Address) -> String {
    let full = addr.to_string();
    if full.len() > 10 {
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    } else {
        full
    }
}

// ---------------------------------------------------------------------------
// Pool identity
// ---------------------------------------------------------------------------

/// 32-byte pool identifier as used by the hook's storage mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(pub B256);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PoolId {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s.trim())
            .map(PoolId)
            .map_err(|e| AgentError::Config(format!("Invalid pool id {s}: {e}")))
    }
}

impl PoolId {
    /// Abbreviated form for log fields.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}..{}", &full[..10], &full[full.len() - 4..])
    }
}

/// The pool key passed to state-changing hook calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolKey {
    pub currency0: Address,
    pub currency1: Address,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
}

// ---------------------------------------------------------------------------
// Auction rules
// ---------------------------------------------------------------------------

/// Contract-level constants governing every auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuctionRules {
    /// Minimum amount a new bid must exceed the highest standing rent by.
    #[serde(with = "rust_decimal::serde::str")]
    pub min_bid_increment: Wei,
    /// Blocks of rent a deposit must cover.
    pub min_deposit_blocks: u64,
    /// Blocks between bid acceptance and activation.
    pub activation_delay: u64,
    pub min_fee: u32,
    pub max_fee: u32,
}

impl Default for AuctionRules {
    fn default() -> Self {
        Self {
            min_bid_increment: dec!(100),
            min_deposit_blocks: 100,
            activation_delay: 5,
            min_fee: 500,
            max_fee: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Auction state
// ---------------------------------------------------------------------------

/// Current management state of one pool's auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuctionState {
    /// `None` when nobody holds management rights.
    pub current_manager: Option<Address>,
    #[serde(with = "rust_decimal::serde::str")]
    pub rent_per_block: Wei,
    #[serde(with = "rust_decimal::serde::str")]
    pub manager_deposit: Wei,
    pub last_rent_block: u64,
    pub current_fee: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_rent_paid: Wei,
}

impl AuctionState {
    /// A freshly initialised auction with no manager.
    pub fn unmanaged(initial_fee: u32) -> Self {
        Self {
            current_manager: None,
            rent_per_block: Decimal::ZERO,
            manager_deposit: Decimal::ZERO,
            last_rent_block: 0,
            current_fee: initial_fee,
            total_rent_paid: Decimal::ZERO,
        }
    }

    pub fn is_managed_by(&self, who: &Address) -> bool {
        self.current_manager.as_ref() == Some(who)
    }

    /// Rent accrued since the last settlement, saturating at `Decimal::MAX`.
    pub fn rent_owed(&self, current_block: u64) -> Wei {
        let blocks = current_block.saturating_sub(self.last_rent_block);
        Decimal::from(blocks).saturating_mul(self.rent_per_block)
    }

    /// Whole blocks of rent the remaining deposit still covers.
    /// `None` when no rent is being charged.
    pub fn deposit_runway(&self, current_block: u64) -> Option<u64> {
        if self.rent_per_block <= Decimal::ZERO {
            return None;
        }
        let remaining = (self.manager_deposit - self.rent_owed(current_block)).max(Decimal::ZERO);
        (remaining / self.rent_per_block).trunc().to_u64()
    }
}

impl fmt::Display for AuctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let manager = self
            .current_manager
            .as_ref()
            .map(short_address)
            .unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "manager={manager} rent={} wei/block fee={} deposit={} wei",
            self.rent_per_block, self.current_fee, self.manager_deposit,
        )
    }
}

// ---------------------------------------------------------------------------
// Bids
// ---------------------------------------------------------------------------

/// A bid accepted by the contract but not yet active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingBid {
    pub bidder: Address,
    #[serde(with = "rust_decimal::serde::str")]
    pub rent_per_block: Wei,
    #[serde(with = "rust_decimal::serde::str")]
    pub deposit: Wei,
    pub activation_block: u64,
    /// Unix timestamp of acceptance.
    pub timestamp: u64,
}

impl PendingBid {
    /// Record a bid accepted at `bid_block`; activation is pinned to
    /// `bid_block + activation_delay`.
    pub fn accepted_at(
        bidder: Address,
        rent_per_block: Wei,
        deposit: Wei,
        bid_block: u64,
        timestamp: u64,
        rules: &AuctionRules,
    ) -> Self {
        Self {
            bidder,
            rent_per_block,
            deposit,
            activation_block: bid_block.saturating_add(rules.activation_delay),
            timestamp,
        }
    }

    /// Whether the bid may take over management at `block`.
    pub fn is_activatable_at(&self, block: u64) -> bool {
        block >= self.activation_block
    }

    /// Blocks left before activation (0 once activatable).
    pub fn blocks_until_activation(&self, block: u64) -> u64 {
        self.activation_block.saturating_sub(block)
    }
}

impl fmt::Display for PendingBid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} wei/block (activates at block {})",
            short_address(&self.bidder),
            self.rent_per_block,
            self.activation_block,
        )
    }
}

/// Replace the pool's pending bid with a newly accepted one.
///
/// At most one bid is pending per pool: the newcomer takes the slot whole
/// and the superseded bid is handed back untouched.
pub fn supersede_pending(slot: &mut Option<PendingBid>, incoming: PendingBid) -> Option<PendingBid> {
    slot.replace(incoming)
}

/// Append-only audit trail of accepted bids, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BidHistory {
    records: Vec<PendingBid>,
}

impl BidHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records already in chain order (oldest first).
    pub fn from_records(records: Vec<PendingBid>) -> Self {
        Self { records }
    }

    pub fn append(&mut self, bid: PendingBid) {
        self.records.push(bid);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> Option<&PendingBid> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingBid> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[PendingBid] {
        &self.records
    }
}

// ---------------------------------------------------------------------------
// Invariant checks
// ---------------------------------------------------------------------------

/// Highest rent a challenger has to beat: the active rent or the pending one.
pub fn highest_rent(state: &AuctionState, pending: Option<&PendingBid>) -> Wei {
    pending
        .map(|p| p.rent_per_block)
        .unwrap_or(Decimal::ZERO)
        .max(state.rent_per_block)
}

/// Smallest rent the contract will accept as a new bid.
pub fn required_bid(state: &AuctionState, pending: Option<&PendingBid>, increment: Wei) -> Wei {
    highest_rent(state, pending).saturating_add(increment)
}

/// Deposit required to back `rent_per_block`. A deposit too large to
/// represent is a `Build` error.
pub fn required_deposit(rent_per_block: Wei, rules: &AuctionRules) -> Result<Wei, AgentError> {
    rent_per_block
        .checked_mul(Decimal::from(rules.min_deposit_blocks))
        .ok_or_else(|| {
            AgentError::Build(format!(
                "Deposit for {rent_per_block} wei/block over {} blocks overflows",
                rules.min_deposit_blocks
            ))
        })
}

/// Bid ordering: `new_rent >= max(current, pending) + increment`.
pub fn validate_bid(
    new_rent: Wei,
    state: &AuctionState,
    pending: Option<&PendingBid>,
    rules: &AuctionRules,
) -> Result<(), AgentError> {
    if new_rent <= Decimal::ZERO {
        return Err(AgentError::Build(format!("Bid rent must be positive, got {new_rent}")));
    }
    if new_rent.fract() != Decimal::ZERO {
        return Err(AgentError::Build(format!("Bid rent must be whole wei, got {new_rent}")));
    }
    let required = required_bid(state, pending, rules.min_bid_increment);
    if new_rent < required {
        return Err(AgentError::Build(format!(
            "Bid {new_rent} wei/block is below the required {required} wei/block"
        )));
    }
    Ok(())
}

/// Deposit sufficiency: `deposit >= rent * min_deposit_blocks`.
pub fn validate_deposit(rent_per_block: Wei, deposit: Wei, rules: &AuctionRules) -> Result<(), AgentError> {
    let required = required_deposit(rent_per_block, rules)?;
    if deposit < required {
        return Err(AgentError::Build(format!(
            "Deposit {deposit} wei does not cover {} blocks of rent ({required} wei)",
            rules.min_deposit_blocks
        )));
    }
    Ok(())
}

/// Clamp a raw fee into `[min_fee, max_fee]`.
///
/// Total for any input: if the bounds arrive inverted the upper bound wins.
pub fn clamp_fee(raw: Decimal, min_fee: u32, max_fee: u32) -> u32 {
    let lo = Decimal::from(min_fee.min(max_fee));
    let hi = Decimal::from(max_fee);
    raw.trunc().max(lo).min(hi).to_u32().unwrap_or(max_fee)
}

pub fn validate_fee(fee: u32, rules: &AuctionRules) -> Result<(), AgentError> {
    if fee < rules.min_fee || fee > rules.max_fee {
        return Err(AgentError::Build(format!(
            "Fee {fee} outside [{}, {}]",
            rules.min_fee, rules.max_fee
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One consistent read of a pool's auction, as consumed by a single cycle.
#[derive(Debug, Clone, Serialize)]
pub struct AuctionSnapshot {
    pub pool: PoolId,
    pub state: AuctionState,
    pub pending: Option<PendingBid>,
    pub block: u64,
    pub fetched_at: DateTime<Utc>,
}

impl AuctionSnapshot {
    pub fn highest_rent(&self) -> Wei {
        highest_rent(&self.state, self.pending.as_ref())
    }

    pub fn rent_owed(&self) -> Wei {
        self.state.rent_owed(self.block)
    }

    pub fn deposit_runway(&self) -> Option<u64> {
        self.state.deposit_runway(self.block)
    }

    /// Pending bid that has reached its activation block but not yet been
    /// applied by the contract.
    pub fn activatable_pending(&self) -> Option<&PendingBid> {
        self.pending.as_ref().filter(|p| p.is_activatable_at(self.block))
    }
}

// ---------------------------------------------------------------------------
// Estimates
// ---------------------------------------------------------------------------

/// Profitability signal for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectedProfit {
    /// Expected profit per block of management, in wei. May be zero or negative.
    #[serde(with = "rust_decimal::serde::str")]
    pub profit_per_block: Wei,
    /// Current volatility as a fraction (0.02 = 2%), assumed already smoothed.
    pub volatility: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl ExpectedProfit {
    pub fn new(profit_per_block: Wei, volatility: Decimal) -> Self {
        Self {
            profit_per_block,
            volatility,
            observed_at: Utc::now(),
        }
    }

    /// Neutral estimate: no profit, no volatility.
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    /// Keep the volatility signal but discard the profit figure.
    pub fn without_profit(&self) -> Self {
        Self {
            profit_per_block: Decimal::ZERO,
            ..self.clone()
        }
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.observed_at).num_seconds()
    }
}

impl fmt::Display for ExpectedProfit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "profit={} wei/block vol={:.2}%",
            self.profit_per_block,
            self.volatility.saturating_mul(dec!(100)),
        )
    }
}

// ---------------------------------------------------------------------------
// Actions & outcomes
// ---------------------------------------------------------------------------

/// What the decision engine wants done this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SubmitBid {
        #[serde(with = "rust_decimal::serde::str")]
        rent_per_block: Wei,
    },
    SetFee { fee: u32 },
    NoAction,
}

impl Action {
    pub fn is_noop(&self) -> bool {
        matches!(self, Action::NoAction)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SubmitBid { rent_per_block } => write!(
                f,
                "SubmitBid({} wei/block = {} ETH)",
                rent_per_block,
                wei_to_eth(*rent_per_block).normalize()
            ),
            Action::SetFee { fee } => write!(f, "SetFee({fee})"),
            Action::NoAction => write!(f, "NoAction"),
        }
    }
}

/// Handle to a broadcast (or simulated) transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxHandle {
    /// `0x`-prefixed hash, or a `dry-run-<uuid>` marker.
    pub hash: String,
    pub submitted_at: DateTime<Utc>,
    pub dry_run: bool,
}

impl TxHandle {
    pub fn broadcast(hash: String) -> Self {
        Self {
            hash,
            submitted_at: Utc::now(),
            dry_run: false,
        }
    }

    pub fn dry_run() -> Self {
        Self {
            hash: format!("dry-run-{}", uuid::Uuid::new_v4()),
            submitted_at: Utc::now(),
            dry_run: true,
        }
    }
}

/// Mined transaction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// How an action ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Nothing to do this cycle.
    Idle,
    /// Logged only; nothing was broadcast.
    DryRun,
    /// Broadcast; confirmation still outstanding.
    Submitted,
    /// Broadcast and confirmed successfully.
    Confirmed,
    /// Mined with a failed status.
    Reverted,
    /// Rejected locally before broadcast.
    BuildFailed,
    /// Signing or broadcast failed.
    SubmissionFailed,
    /// Broadcast, but no receipt within the confirmation window.
    Unconfirmed,
    /// Broadcast, but the wait was dropped on shutdown.
    Abandoned,
}

/// Typed result of executing one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub kind: OutcomeKind,
    pub tx: Option<TxHandle>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<AgentError>,
}

fn serialize_error<S: serde::Serializer>(err: &Option<AgentError>, s: S) -> Result<S::Ok, S::Error> {
    match err {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl ActionOutcome {
    pub fn idle() -> Self {
        Self {
            kind: OutcomeKind::Idle,
            tx: None,
            error: None,
        }
    }

    pub fn failed(kind: OutcomeKind, tx: Option<TxHandle>, error: AgentError) -> Self {
        Self {
            kind,
            tx,
            error: Some(error),
        }
    }

    pub fn succeeded(kind: OutcomeKind, tx: TxHandle) -> Self {
        Self {
            kind,
            tx: Some(tx),
            error: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
