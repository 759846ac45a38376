//! Rent-auction hook client.
//!
//! Reads go through the `sol!`-generated contract bindings. Writes are
//! assembled by hand: pending nonce, EIP-1559 fee estimate, gas estimate,
//! local signing, raw broadcast. The provider and signer are created once
//! and shared by every pool worker and upkeep task; sends are serialised so
//! two of them never pick the same nonce.

use std::str::FromStr;
use std::time::Duration;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{ReceiptResponse, TransactionBuilder, TxSignerSync};
use alloy::primitives::aliases::{I24, U24};
use alloy::primitives::{Address, TxKind, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::eth::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::{AuctionContract, ContractRules};
use crate::error::AgentError;
use crate::types::{
    AuctionState, BidHistory, PendingBid, PoolId, PoolKey, Receipt, TxHandle, Wei,
};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    #[sol(rpc)]
    interface IAuctionPoolHook {
        struct PoolKey {
            address currency0;
            address currency1;
            uint24 fee;
            int24 tickSpacing;
            address hooks;
        }

        struct Bid {
            address bidder;
            uint256 rentPerBlock;
            uint256 deposit;
            uint256 activationBlock;
            uint256 timestamp;
        }

        function poolAuctions(bytes32 poolId) external view returns (
            address currentManager,
            uint256 rentPerBlock,
            uint256 managerDeposit,
            uint256 lastRentBlock,
            uint24 currentFee,
            uint256 totalRentPaid
        );
        function nextBid(bytes32 poolId) external view returns (
            address bidder,
            uint256 rentPerBlock,
            uint256 deposit,
            uint256 activationBlock,
            uint256 timestamp
        );
        function getBidHistory(bytes32 poolId) external view returns (Bid[] memory);

        function MIN_BID_INCREMENT() external view returns (uint256);
        function MIN_DEPOSIT_BLOCKS() external view returns (uint256);
        function ACTIVATION_DELAY() external view returns (uint256);
        function MAX_FEE() external view returns (uint24);

        function submitBid(PoolKey calldata key, uint256 rentPerBlock) external payable;
        function setSwapFee(PoolKey calldata key, uint24 newFee) external;

        function managerFees(address manager, bytes32 poolId) external view returns (uint256);
        function withdrawManagerFees(PoolKey calldata key) external;
    }
}

/// Gas limit = estimate * 120%.
const GAS_HEADROOM_PCT: u64 = 120;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// U256 wei → `Wei`. Values beyond `Decimal`'s range are a read error.
pub fn u256_to_wei(value: U256) -> Result<Wei, AgentError> {
    if value > U256::from(u128::MAX) {
        return Err(AgentError::ChainRead(format!("Amount {value} exceeds supported range")));
    }
    Decimal::from_u128(value.to::<u128>())
        .ok_or_else(|| AgentError::ChainRead(format!("Amount {value} exceeds supported range")))
}

/// `Wei` → U256. Fractional wei are truncated; negatives are rejected.
pub fn wei_to_u256(amount: Wei) -> Result<U256, AgentError> {
    amount
        .trunc()
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| AgentError::Build(format!("Amount {amount} cannot be encoded as uint256")))
}

fn encode_pool_key(key: &PoolKey) -> Result<IAuctionPoolHook::PoolKey, AgentError> {
    let fee = U24::try_from(key.fee)
        .map_err(|_| AgentError::Build(format!("Pool fee {} does not fit uint24", key.fee)))?;
    let tick_spacing = I24::try_from(key.tick_spacing).map_err(|_| {
        AgentError::Build(format!("Tick spacing {} does not fit int24", key.tick_spacing))
    })?;
    Ok(IAuctionPoolHook::PoolKey {
        currency0: key.currency0,
        currency1: key.currency1,
        fee,
        tickSpacing: tick_spacing,
        hooks: key.hooks,
    })
}

fn encode_fee(fee: u32) -> Result<U24, AgentError> {
    U24::try_from(fee).map_err(|_| AgentError::Build(format!("Fee {fee} does not fit uint24")))
}

fn bid_from_chain(bid: &IAuctionPoolHook::Bid) -> Result<PendingBid, AgentError> {
    Ok(PendingBid {
        bidder: bid.bidder,
        rent_per_block: u256_to_wei(bid.rentPerBlock)?,
        deposit: u256_to_wei(bid.deposit)?,
        activation_block: bid.activationBlock.saturating_to::<u64>(),
        timestamp: bid.timestamp.saturating_to::<u64>(),
    })
}

fn read_err(what: &str) -> impl Fn(alloy::contract::Error) -> AgentError + '_ {
    move |e| AgentError::ChainRead(format!("{what}: {e}"))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct HookContract {
    provider: RootProvider,
    signer: PrivateKeySigner,
    address: Address,
    chain_id: u64,
    /// Serialises nonce selection through broadcast across all senders.
    send_lock: tokio::sync::Mutex<()>,
}

impl HookContract {
    /// Connect to the RPC endpoint and load the operator key.
    pub async fn connect(
        rpc_url: &str,
        hook_address: Address,
        private_key: &SecretString,
    ) -> Result<Self, AgentError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| AgentError::Config(format!("Invalid RPC URL: {e}")))?;
        let provider = RootProvider::new_http(url);

        let signer = PrivateKeySigner::from_str(private_key.expose_secret().trim_start_matches("0x"))
            .map_err(|e| AgentError::Config(format!("Invalid operator private key: {e}")))?;

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| AgentError::ChainRead(format!("eth_chainId: {e}")))?;

        info!(
            hook = %hook_address,
            operator = %signer.address(),
            chain_id,
            "Connected to auction hook"
        );

        Ok(Self {
            provider,
            signer,
            address: hook_address,
            chain_id,
            send_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn hook(&self) -> IAuctionPoolHook::IAuctionPoolHookInstance<RootProvider> {
        IAuctionPoolHook::new(self.address, self.provider.clone())
    }

    /// Sign and broadcast a call to the hook.
    async fn send(&self, input: Vec<u8>, value: U256, label: &str) -> Result<TxHandle, AgentError> {
        let _sending = self.send_lock.lock().await;
        let from = self.signer.address();
        let submission = |e: String| AgentError::Submission(format!("{label}: {e}"));

        let nonce = self
            .provider
            .get_transaction_count(from)
            .pending()
            .await
            .map_err(|e| submission(format!("nonce: {e}")))?;

        let fees = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| submission(format!("fee estimate: {e}")))?;

        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(self.address)
            .with_value(value)
            .with_input(input.clone());
        let gas_estimate = self
            .provider
            .estimate_gas(request)
            .await
            .map_err(|e| submission(format!("gas estimate: {e}")))?;
        let gas_limit = gas_estimate.saturating_mul(GAS_HEADROOM_PCT) / 100;

        let mut tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit,
            to: TxKind::Call(self.address),
            value,
            access_list: Default::default(),
            input: input.into(),
        };

        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .map_err(|e| submission(format!("sign: {e}")))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        let raw = signed.encoded_2718();

        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| submission(format!("broadcast: {e}")))?;
        let hash = format!("{:#x}", pending.tx_hash());

        debug!(label, nonce, gas_limit, tx_hash = %hash, "Transaction broadcast");
        Ok(TxHandle::broadcast(hash))
    }
}

#[async_trait]
impl AuctionContract for HookContract {
    async fn block_number(&self) -> Result<u64, AgentError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| AgentError::ChainRead(format!("eth_blockNumber: {e}")))
    }

    async fn read_auction_state(&self, pool: PoolId) -> Result<AuctionState, AgentError> {
        let raw = self
            .hook()
            .poolAuctions(pool.0)
            .call()
            .await
            .map_err(read_err("poolAuctions"))?;

        let current_manager = (raw.currentManager != Address::ZERO).then_some(raw.currentManager);
        Ok(AuctionState {
            current_manager,
            rent_per_block: u256_to_wei(raw.rentPerBlock)?,
            manager_deposit: u256_to_wei(raw.managerDeposit)?,
            last_rent_block: raw.lastRentBlock.saturating_to::<u64>(),
            current_fee: raw.currentFee.saturating_to::<u32>(),
            total_rent_paid: u256_to_wei(raw.totalRentPaid)?,
        })
    }

    async fn read_pending_bid(&self, pool: PoolId) -> Result<Option<PendingBid>, AgentError> {
        let raw = self
            .hook()
            .nextBid(pool.0)
            .call()
            .await
            .map_err(read_err("nextBid"))?;

        if raw.bidder == Address::ZERO {
            return Ok(None);
        }
        let bid = IAuctionPoolHook::Bid {
            bidder: raw.bidder,
            rentPerBlock: raw.rentPerBlock,
            deposit: raw.deposit,
            activationBlock: raw.activationBlock,
            timestamp: raw.timestamp,
        };
        bid_from_chain(&bid).map(Some)
    }

    async fn read_bid_history(&self, pool: PoolId) -> Result<BidHistory, AgentError> {
        let raw = self
            .hook()
            .getBidHistory(pool.0)
            .call()
            .await
            .map_err(read_err("getBidHistory"))?;

        let records = raw.iter().map(bid_from_chain).collect::<Result<Vec<_>, _>>()?;
        Ok(BidHistory::from_records(records))
    }

    async fn read_rules(&self) -> Result<ContractRules, AgentError> {
        let hook = self.hook();
        let increment = hook.MIN_BID_INCREMENT();
        let deposit_blocks = hook.MIN_DEPOSIT_BLOCKS();
        let delay = hook.ACTIVATION_DELAY();
        let max_fee = hook.MAX_FEE();

        let (increment, deposit_blocks, delay, max_fee) = tokio::try_join!(
            async { increment.call().await.map_err(read_err("MIN_BID_INCREMENT")) },
            async { deposit_blocks.call().await.map_err(read_err("MIN_DEPOSIT_BLOCKS")) },
            async { delay.call().await.map_err(read_err("ACTIVATION_DELAY")) },
            async { max_fee.call().await.map_err(read_err("MAX_FEE")) },
        )?;

        Ok(ContractRules {
            min_bid_increment: u256_to_wei(increment)?,
            min_deposit_blocks: deposit_blocks.saturating_to::<u64>(),
            activation_delay: delay.saturating_to::<u64>(),
            max_fee: max_fee.saturating_to::<u32>(),
        })
    }

    async fn submit_bid(
        &self,
        key: &PoolKey,
        rent_per_block: Wei,
        deposit: Wei,
    ) -> Result<TxHandle, AgentError> {
        let call = IAuctionPoolHook::submitBidCall {
            key: encode_pool_key(key)?,
            rentPerBlock: wei_to_u256(rent_per_block)?,
        };
        self.send(call.abi_encode(), wei_to_u256(deposit)?, "submitBid").await
    }

    async fn set_fee(&self, key: &PoolKey, new_fee: u32) -> Result<TxHandle, AgentError> {
        let call = IAuctionPoolHook::setSwapFeeCall {
            key: encode_pool_key(key)?,
            newFee: encode_fee(new_fee)?,
        };
        self.send(call.abi_encode(), U256::ZERO, "setSwapFee").await
    }

    async fn read_manager_fees(&self, manager: Address, pool: PoolId) -> Result<Wei, AgentError> {
        let fees = self
            .hook()
            .managerFees(manager, pool.0)
            .call()
            .await
            .map_err(read_err("managerFees"))?;
        u256_to_wei(fees)
    }

    async fn withdraw_manager_fees(&self, key: &PoolKey) -> Result<TxHandle, AgentError> {
        let call = IAuctionPoolHook::withdrawManagerFeesCall {
            key: encode_pool_key(key)?,
        };
        self.send(call.abi_encode(), U256::ZERO, "withdrawManagerFees").await
    }

    async fn gas_price(&self) -> Result<Wei, AgentError> {
        let price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| AgentError::ChainRead(format!("eth_gasPrice: {e}")))?;
        Decimal::from_u128(price)
            .ok_or_else(|| AgentError::ChainRead(format!("Gas price {price} exceeds supported range")))
    }

    async fn balance(&self, who: Address) -> Result<Wei, AgentError> {
        let balance = self
            .provider
            .get_balance(who)
            .await
            .map_err(|e| AgentError::ChainRead(format!("eth_getBalance: {e}")))?;
        u256_to_wei(balance)
    }

    async fn wait_for_receipt(&self, tx: &TxHandle) -> Result<Receipt, AgentError> {
        let hash = B256::from_str(&tx.hash)
            .map_err(|e| AgentError::Submission(format!("Bad tx hash {}: {e}", tx.hash)))?;

        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(rcpt)) => {
                    return Ok(Receipt {
                        tx_hash: tx.hash.clone(),
                        success: rcpt.status(),
                        block_number: rcpt.block_number,
                        gas_used: rcpt.gas_used,
                    });
                }
                Ok(None) => {}
                Err(e) => debug!(tx_hash = %tx.hash, error = %e, "Receipt poll failed"),
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    fn operator(&self) -> Address {
        self.signer.address()
    }
}
