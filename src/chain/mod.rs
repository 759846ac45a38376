//! Chain boundary.
//!
//! Defines the `AuctionContract` trait that the reader and executor talk
//! to, and the alloy-backed implementation for the rent-auction hook.

pub mod hook;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Serialize;

use crate::error::AgentError;
use crate::types::{
    AuctionRules, AuctionState, BidHistory, PendingBid, PoolId, PoolKey, Receipt, TxHandle, Wei,
};

/// Auction constants published by the hook contract itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractRules {
    #[serde(with = "rust_decimal::serde::str")]
    pub min_bid_increment: Wei,
    pub min_deposit_blocks: u64,
    pub activation_delay: u64,
    pub max_fee: u32,
}

impl AuctionRules {
    /// Overlay the contract's published constants onto these rules,
    /// returning the names of the fields that changed.
    pub fn apply_contract(&mut self, onchain: &ContractRules) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.min_bid_increment != onchain.min_bid_increment {
            self.min_bid_increment = onchain.min_bid_increment;
            changed.push("min_bid_increment");
        }
        if self.min_deposit_blocks != onchain.min_deposit_blocks {
            self.min_deposit_blocks = onchain.min_deposit_blocks;
            changed.push("min_deposit_blocks");
        }
        if self.activation_delay != onchain.activation_delay {
            self.activation_delay = onchain.activation_delay;
            changed.push("activation_delay");
        }
        if self.max_fee != onchain.max_fee {
            self.max_fee = onchain.max_fee;
            changed.push("max_fee");
        }
        changed
    }
}

/// Abstraction over the rent-auction contract.
///
/// Reads are side-effect free. `submit_bid` and `set_fee` sign and
/// broadcast a transaction and return as soon as it is accepted by the
/// node; confirmation is a separate `wait_for_receipt` call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuctionContract: Send + Sync {
    /// Latest block height.
    async fn block_number(&self) -> Result<u64, AgentError>;

    async fn read_auction_state(&self, pool: PoolId) -> Result<AuctionState, AgentError>;

    /// `None` when the contract reports no pending bid.
    async fn read_pending_bid(&self, pool: PoolId) -> Result<Option<PendingBid>, AgentError>;

    async fn read_bid_history(&self, pool: PoolId) -> Result<BidHistory, AgentError>;

    async fn read_rules(&self) -> Result<ContractRules, AgentError>;

    /// Submit a bid carrying `deposit` as transaction value.
    async fn submit_bid(
        &self,
        key: &PoolKey,
        rent_per_block: Wei,
        deposit: Wei,
    ) -> Result<TxHandle, AgentError>;

    async fn set_fee(&self, key: &PoolKey, new_fee: u32) -> Result<TxHandle, AgentError>;

    /// Poll until the transaction is mined. Callers bound this with a timeout.
    async fn wait_for_receipt(&self, tx: &TxHandle) -> Result<Receipt, AgentError>;

    /// Swap fees accrued to `manager` on `pool` and not yet withdrawn.
    async fn read_manager_fees(&self, manager: Address, pool: PoolId) -> Result<Wei, AgentError>;

    async fn withdraw_manager_fees(&self, key: &PoolKey) -> Result<TxHandle, AgentError>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<Wei, AgentError>;

    /// Native balance of `who` in wei.
    async fn balance(&self, who: Address) -> Result<Wei, AgentError>;

    /// Address of the signing operator.
    fn operator(&self) -> Address;
}
