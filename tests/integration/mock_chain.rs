//! In-memory auction hook for integration testing.
//!
//! Accepts bids into a single pending slot per pool, records fee updates
//! and lets each test choose how receipts resolve.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::Address;
use auction_operator::chain::{AuctionContract, ContractRules};
use auction_operator::error::AgentError;
use auction_operator::types::*;

/// How `wait_for_receipt` resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Success,
    Revert,
    /// Resolve successfully after a delay.
    Slow(Duration),
    /// Never resolve.
    Never,
}

#[derive(Debug, Default)]
struct PoolState {
    auction: Option<AuctionState>,
    pending: Option<PendingBid>,
    history: BidHistory,
}

pub struct MockChain {
    operator: Address,
    rules: AuctionRules,
    block: Mutex<u64>,
    pools: Mutex<HashMap<PoolId, PoolState>>,
    fees_set: Mutex<Vec<u32>>,
    receipt_mode: Mutex<ReceiptMode>,
    fail_reads: Mutex<bool>,
    /// Whether a broadcast bid shows up as pending before it is mined.
    apply_bids: Mutex<bool>,
    manager_fees: Mutex<Wei>,
    withdrawals: AtomicUsize,
    bids_submitted: AtomicUsize,
    receipts_requested: AtomicUsize,
    tx_counter: AtomicUsize,
}

impl MockChain {
    pub fn new(operator: Address, rules: AuctionRules) -> Self {
        Self {
            operator,
            rules,
            block: Mutex::new(1_000),
            pools: Mutex::new(HashMap::new()),
            fees_set: Mutex::new(Vec::new()),
            receipt_mode: Mutex::new(ReceiptMode::Success),
            fail_reads: Mutex::new(false),
            apply_bids: Mutex::new(true),
            manager_fees: Mutex::new(Wei::ZERO),
            withdrawals: AtomicUsize::new(0),
            bids_submitted: AtomicUsize::new(0),
            receipts_requested: AtomicUsize::new(0),
            tx_counter: AtomicUsize::new(0),
        }
    }

    pub fn set_auction(&self, pool: PoolId, state: AuctionState) {
        self.pools.lock().unwrap().entry(pool).or_default().auction = Some(state);
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        *self.receipt_mode.lock().unwrap() = mode;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    pub fn set_apply_bids(&self, apply: bool) {
        *self.apply_bids.lock().unwrap() = apply;
    }

    /// Fees accrued to the operator, for whichever pool is queried.
    pub fn set_manager_fees(&self, fees: Wei) {
        *self.manager_fees.lock().unwrap() = fees;
    }

    pub fn withdrawals(&self) -> usize {
        self.withdrawals.load(Ordering::SeqCst)
    }

    pub fn advance_blocks(&self, n: u64) {
        *self.block.lock().unwrap() += n;
    }

    pub fn pending(&self, pool: PoolId) -> Option<PendingBid> {
        self.pools.lock().unwrap().get(&pool).and_then(|p| p.pending.clone())
    }

    pub fn history_len(&self, pool: PoolId) -> usize {
        self.pools.lock().unwrap().get(&pool).map(|p| p.history.len()).unwrap_or(0)
    }

    pub fn fees_set(&self) -> Vec<u32> {
        self.fees_set.lock().unwrap().clone()
    }

    pub fn bids_submitted(&self) -> usize {
        self.bids_submitted.load(Ordering::SeqCst)
    }

    pub fn receipts_requested(&self) -> usize {
        self.receipts_requested.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), AgentError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(AgentError::ChainRead("rpc unavailable".into()));
        }
        Ok(())
    }

    fn next_hash(&self) -> String {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("0x{n:064x}")
    }

    /// Single-pool tests only: any registered pool matches the key.
    fn pool_for(&self, _key: &PoolKey) -> Option<PoolId> {
        self.pools.lock().unwrap().keys().next().copied()
    }
}

#[async_trait]
impl AuctionContract for MockChain {
    async fn block_number(&self) -> Result<u64, AgentError> {
        self.check_reads()?;
        Ok(*self.block.lock().unwrap())
    }

    async fn read_auction_state(&self, pool: PoolId) -> Result<AuctionState, AgentError> {
        self.check_reads()?;
        Ok(self
            .pools
            .lock()
            .unwrap()
            .get(&pool)
            .and_then(|p| p.auction.clone())
            .unwrap_or_else(|| AuctionState::unmanaged(3000)))
    }

    async fn read_pending_bid(&self, pool: PoolId) -> Result<Option<PendingBid>, AgentError> {
        self.check_reads()?;
        Ok(self.pending(pool))
    }

    async fn read_bid_history(&self, pool: PoolId) -> Result<BidHistory, AgentError> {
        self.check_reads()?;
        Ok(self
            .pools
            .lock()
            .unwrap()
            .get(&pool)
            .map(|p| p.history.clone())
            .unwrap_or_default())
    }

    async fn read_rules(&self) -> Result<ContractRules, AgentError> {
        Ok(ContractRules {
            min_bid_increment: self.rules.min_bid_increment,
            min_deposit_blocks: self.rules.min_deposit_blocks,
            activation_delay: self.rules.activation_delay,
            max_fee: self.rules.max_fee,
        })
    }

    async fn submit_bid(
        &self,
        key: &PoolKey,
        rent_per_block: Wei,
        deposit: Wei,
    ) -> Result<TxHandle, AgentError> {
        let pool = self
            .pool_for(key)
            .ok_or_else(|| AgentError::Submission("unknown pool".into()))?;
        self.bids_submitted.fetch_add(1, Ordering::SeqCst);
        if !*self.apply_bids.lock().unwrap() {
            return Ok(TxHandle::broadcast(self.next_hash()));
        }

        let block = *self.block.lock().unwrap();
        let bid = PendingBid::accepted_at(self.operator, rent_per_block, deposit, block, 0, &self.rules);

        let mut pools = self.pools.lock().unwrap();
        let state = pools.entry(pool).or_default();
        supersede_pending(&mut state.pending, bid.clone());
        state.history.append(bid);
        Ok(TxHandle::broadcast(self.next_hash()))
    }

    async fn set_fee(&self, key: &PoolKey, new_fee: u32) -> Result<TxHandle, AgentError> {
        if let Some(pool) = self.pool_for(key) {
            if let Some(auction) = self.pools.lock().unwrap().get_mut(&pool).and_then(|p| p.auction.as_mut()) {
                auction.current_fee = new_fee;
            }
        }
        self.fees_set.lock().unwrap().push(new_fee);
        Ok(TxHandle::broadcast(self.next_hash()))
    }

    async fn wait_for_receipt(&self, tx: &TxHandle) -> Result<Receipt, AgentError> {
        self.receipts_requested.fetch_add(1, Ordering::SeqCst);
        let mode = *self.receipt_mode.lock().unwrap();
        let receipt = |success| Receipt {
            tx_hash: tx.hash.clone(),
            success,
            block_number: Some(1_001),
            gas_used: 90_000,
        };
        match mode {
            ReceiptMode::Success => Ok(receipt(true)),
            ReceiptMode::Revert => Ok(receipt(false)),
            ReceiptMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(receipt(true))
            }
            ReceiptMode::Never => std::future::pending().await,
        }
    }

    async fn read_manager_fees(&self, manager: Address, _pool: PoolId) -> Result<Wei, AgentError> {
        self.check_reads()?;
        if manager != self.operator {
            return Ok(Wei::ZERO);
        }
        Ok(*self.manager_fees.lock().unwrap())
    }

    async fn withdraw_manager_fees(&self, _key: &PoolKey) -> Result<TxHandle, AgentError> {
        *self.manager_fees.lock().unwrap() = Wei::ZERO;
        self.withdrawals.fetch_add(1, Ordering::SeqCst);
        Ok(TxHandle::broadcast(self.next_hash()))
    }

    /// 10 gwei.
    async fn gas_price(&self) -> Result<Wei, AgentError> {
        Ok(Wei::from(10_000_000_000u64))
    }

    async fn balance(&self, _who: Address) -> Result<Wei, AgentError> {
        self.check_reads()?;
        Ok(Wei::from(1_000_000_000_000_000_000u64))
    }

    fn operator(&self) -> Address {
        self.operator
    }
}
