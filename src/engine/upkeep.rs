//! Upkeep tasks that run beside the decision cycle.
//!
//! - `FeeWithdrawer`: per pool, withdraws the swap fees accrued to the
//!   operator once they are worth at least a multiple of the gas it costs.
//! - `BalanceMonitor`: logs the operator wallet balance and warns when it
//!   runs low.
//!
//! Both tick on their own interval and stop on the shared shutdown token.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::AuctionContract;
use crate::error::AgentError;
use crate::types::{wei_to_eth, PoolId, PoolKey, TxHandle, Wei};

/// Used when the node cannot quote a gas price (20 gwei).
const FALLBACK_GAS_PRICE: Wei = dec!(20_000_000_000);

// ---------------------------------------------------------------------------
// Fee withdrawal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WithdrawalConfig {
    pub interval: Duration,
    /// Gas assumed for one `withdrawManagerFees` call.
    pub estimated_gas: u64,
    /// Withdraw once fees reach this multiple of the estimated gas cost.
    pub gas_cost_multiple: Decimal,
    pub dry_run: bool,
    pub confirmation_timeout: Duration,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            estimated_gas: 100_000,
            gas_cost_multiple: dec!(2),
            dry_run: false,
            confirmation_timeout: Duration::from_secs(120),
        }
    }
}

/// Smallest accrued amount worth withdrawing. `None` if it overflows.
pub fn withdrawal_threshold(gas_price: Wei, estimated_gas: u64, multiple: Decimal) -> Option<Wei> {
    gas_price
        .checked_mul(Decimal::from(estimated_gas))?
        .checked_mul(multiple)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalOutcome {
    NothingAccrued,
    BelowGasCost { fees: Wei, threshold: Wei },
    DryRun { fees: Wei },
    Withdrawn { fees: Wei, tx: TxHandle },
    Failed(AgentError),
}

pub struct FeeWithdrawer {
    chain: Arc<dyn AuctionContract>,
    pool: PoolId,
    pool_key: PoolKey,
    config: WithdrawalConfig,
}

impl FeeWithdrawer {
    pub fn new(chain: Arc<dyn AuctionContract>, pool: PoolId, pool_key: PoolKey, config: WithdrawalConfig) -> Self {
        Self {
            chain,
            pool,
            pool_key,
            config,
        }
    }

    /// Check accrued fees once and withdraw them if worthwhile.
    pub async fn check_once(&self) -> WithdrawalOutcome {
        let pool = self.pool.short();
        let operator = self.chain.operator();

        let fees = match self.chain.read_manager_fees(operator, self.pool).await {
            Ok(f) => f,
            Err(e) => {
                warn!(pool = %pool, error = %e, "Could not read manager fees");
                return WithdrawalOutcome::Failed(e);
            }
        };
        if fees <= Decimal::ZERO {
            return WithdrawalOutcome::NothingAccrued;
        }

        let gas_price = match self.chain.gas_price().await {
            Ok(p) => p,
            Err(e) => {
                debug!(pool = %pool, error = %e, "Gas price unavailable, using fallback");
                FALLBACK_GAS_PRICE
            }
        };
        let Some(threshold) =
            withdrawal_threshold(gas_price, self.config.estimated_gas, self.config.gas_cost_multiple)
        else {
            warn!(pool = %pool, gas_price = %gas_price, "Withdrawal threshold overflows, skipping");
            return WithdrawalOutcome::BelowGasCost {
                fees,
                threshold: Decimal::MAX,
            };
        };
        if fees < threshold {
            debug!(pool = %pool, fees = %fees, threshold = %threshold, "Accrued fees below withdrawal threshold");
            return WithdrawalOutcome::BelowGasCost { fees, threshold };
        }

        if self.config.dry_run {
            info!(
                pool = %pool,
                fees_eth = %wei_to_eth(fees).normalize(),
                "[DRY RUN] Would withdraw manager fees"
            );
            return WithdrawalOutcome::DryRun { fees };
        }

        info!(pool = %pool, fees_eth = %wei_to_eth(fees).normalize(), "Withdrawing manager fees");
        let tx = match self.chain.withdraw_manager_fees(&self.pool_key).await {
            Ok(tx) => tx,
            Err(e) => {
                error!(pool = %pool, error = %e, "Fee withdrawal failed");
                return WithdrawalOutcome::Failed(e);
            }
        };

        let timeout = self.config.confirmation_timeout;
        let confirmed = match tokio::time::timeout(timeout, self.chain.wait_for_receipt(&tx)).await {
            Ok(Ok(receipt)) if receipt.success => Ok(()),
            Ok(Ok(receipt)) => Err(AgentError::ExecutionReverted {
                tx_hash: receipt.tx_hash,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AgentError::ConfirmationTimeout {
                tx_hash: tx.hash.clone(),
                waited_secs: timeout.as_secs(),
            }),
        };

        match confirmed {
            Ok(()) => {
                info!(pool = %pool, tx_hash = %tx.hash, "Fees withdrawn");
                WithdrawalOutcome::Withdrawn { fees, tx }
            }
            Err(e) => {
                error!(pool = %pool, tx_hash = %tx.hash, error = %e, "Fee withdrawal not confirmed");
                WithdrawalOutcome::Failed(e)
            }
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }
        debug!(pool = %self.pool.short(), "Fee withdrawer stopped");
    }
}

// ---------------------------------------------------------------------------
// Wallet balance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceCheck {
    pub balance: Wei,
    pub low: bool,
}

pub struct BalanceMonitor {
    chain: Arc<dyn AuctionContract>,
    interval: Duration,
    low_balance: Wei,
}

impl BalanceMonitor {
    pub fn new(chain: Arc<dyn AuctionContract>, interval: Duration, low_balance: Wei) -> Self {
        Self {
            chain,
            interval,
            low_balance,
        }
    }

    pub async fn check_once(&self) -> Result<BalanceCheck, AgentError> {
        let operator = self.chain.operator();
        let balance = self.chain.balance(operator).await?;
        let check = BalanceCheck {
            balance,
            low: balance < self.low_balance,
        };

        info!(balance_eth = %wei_to_eth(balance).round_dp(4), "Health check");
        if check.low {
            warn!(
                balance_eth = %wei_to_eth(balance).round_dp(4),
                threshold_eth = %wei_to_eth(self.low_balance).normalize(),
                "Low balance warning"
            );
        }
        Ok(check)
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once().await {
                        warn!(error = %e, "Balance check failed");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
