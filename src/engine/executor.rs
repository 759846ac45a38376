//! Action executor.
//!
//! Turns a decided `Action` into a chain transaction: pre-flight checks
//! against the auction invariants, deposit sizing, then submission through
//! the `AuctionContract`. Confirmation is a separate, time-bounded step so
//! the scheduler can track it as its own phase. In dry-run mode nothing
//! leaves the process.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::chain::AuctionContract;
use crate::error::AgentError;
use crate::types::{
    required_deposit, validate_bid, validate_deposit, validate_fee, wei_to_eth, Action,
    ActionOutcome, AuctionRules, AuctionSnapshot, OutcomeKind, PoolKey, Receipt, TxHandle, Wei,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Log actions instead of broadcasting them.
    pub dry_run: bool,
    pub confirmation_timeout: Duration,
    /// Refuse bids whose deposit would exceed this.
    pub max_deposit: Option<Wei>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            confirmation_timeout: Duration::from_secs(120),
            max_deposit: None,
        }
    }
}

/// A validated transaction, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedTx {
    Bid { rent_per_block: Wei, deposit: Wei },
    Fee { fee: u32 },
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct ActionExecutor {
    chain: Arc<dyn AuctionContract>,
    pool_key: PoolKey,
    rules: AuctionRules,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(
        chain: Arc<dyn AuctionContract>,
        pool_key: PoolKey,
        rules: AuctionRules,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            chain,
            pool_key,
            rules,
            config,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Validate an action against the snapshot it was decided on.
    ///
    /// Returns `Ok(None)` for `NoAction`. Any violation is a `Build` error.
    pub fn prepare(&self, action: &Action, snapshot: &AuctionSnapshot) -> Result<Option<PreparedTx>, AgentError> {
        match action {
            Action::NoAction => Ok(None),
            Action::SubmitBid { rent_per_block } => {
                let rent = *rent_per_block;
                validate_bid(rent, &snapshot.state, snapshot.pending.as_ref(), &self.rules)?;

                let deposit = required_deposit(rent, &self.rules)?;
                validate_deposit(rent, deposit, &self.rules)?;

                if let Some(cap) = self.config.max_deposit {
                    if deposit > cap {
                        return Err(AgentError::Build(format!(
                            "Deposit {} ETH exceeds the configured cap of {} ETH",
                            wei_to_eth(deposit).normalize(),
                            wei_to_eth(cap).normalize()
                        )));
                    }
                }
                Ok(Some(PreparedTx::Bid {
                    rent_per_block: rent,
                    deposit,
                }))
            }
            Action::SetFee { fee } => {
                validate_fee(*fee, &self.rules)?;
                let operator = self.chain.operator();
                if !snapshot.state.is_managed_by(&operator) {
                    return Err(AgentError::Build(format!(
                        "Operator {operator} does not manage pool {}",
                        snapshot.pool.short()
                    )));
                }
                Ok(Some(PreparedTx::Fee { fee: *fee }))
            }
        }
    }

    /// Validate and broadcast. A successful broadcast yields `Submitted`;
    /// the caller follows up with `await_confirmation`.
    pub async fn execute(&self, action: &Action, snapshot: &AuctionSnapshot) -> ActionOutcome {
        let pool = snapshot.pool.short();

        let prepared = match self.prepare(action, snapshot) {
            Ok(Some(p)) => p,
            Ok(None) => return ActionOutcome::idle(),
            Err(e) => {
                error!(pool = %pool, action = %action, error = %e, "Pre-flight check failed");
                return ActionOutcome::failed(OutcomeKind::BuildFailed, None, e);
            }
        };

        if self.config.dry_run {
            match &prepared {
                PreparedTx::Bid { rent_per_block, deposit } => info!(
                    pool = %pool,
                    rent_per_block = %rent_per_block,
                    deposit_eth = %wei_to_eth(*deposit).normalize(),
                    "[DRY RUN] Would submit bid"
                ),
                PreparedTx::Fee { fee } => info!(
                    pool = %pool,
                    from = snapshot.state.current_fee,
                    to = fee,
                    "[DRY RUN] Would set swap fee"
                ),
            }
            return ActionOutcome::succeeded(OutcomeKind::DryRun, TxHandle::dry_run());
        }

        let submitted = match &prepared {
            PreparedTx::Bid { rent_per_block, deposit } => {
                self.chain.submit_bid(&self.pool_key, *rent_per_block, *deposit).await
            }
            PreparedTx::Fee { fee } => self.chain.set_fee(&self.pool_key, *fee).await,
        };

        match submitted {
            Ok(tx) => {
                info!(pool = %pool, action = %action, tx_hash = %tx.hash, "Transaction submitted");
                ActionOutcome::succeeded(OutcomeKind::Submitted, tx)
            }
            Err(e) => {
                let e = match e {
                    AgentError::Build(_) | AgentError::Submission(_) => e,
                    other => AgentError::Submission(other.to_string()),
                };
                warn!(pool = %pool, action = %action, error = %e, "Submission failed, will retry next tick");
                let kind = if matches!(e, AgentError::Build(_)) {
                    OutcomeKind::BuildFailed
                } else {
                    OutcomeKind::SubmissionFailed
                };
                ActionOutcome::failed(kind, None, e)
            }
        }
    }

    /// Wait for the receipt, bounded by the confirmation timeout.
    ///
    /// A mined-but-failed receipt is reported as `ExecutionReverted`.
    pub async fn await_confirmation(&self, tx: &TxHandle) -> Result<Receipt, AgentError> {
        if tx.dry_run {
            return Ok(Receipt {
                tx_hash: tx.hash.clone(),
                success: true,
                block_number: None,
                gas_used: 0,
            });
        }

        let timeout = self.config.confirmation_timeout;
        let receipt = tokio::time::timeout(timeout, self.chain.wait_for_receipt(tx))
            .await
            .map_err(|_| AgentError::ConfirmationTimeout {
                tx_hash: tx.hash.clone(),
                waited_secs: timeout.as_secs(),
            })??;

        if !receipt.success {
            return Err(AgentError::ExecutionReverted {
                tx_hash: receipt.tx_hash,
            });
        }
        Ok(receipt)
    }

    /// Fold a confirmation result into the final outcome for a submitted tx.
    pub fn settle(tx: TxHandle, confirmation: Result<Receipt, AgentError>) -> ActionOutcome {
        match confirmation {
            Ok(receipt) => {
                info!(
                    tx_hash = %receipt.tx_hash,
                    block = ?receipt.block_number,
                    gas_used = receipt.gas_used,
                    "Transaction confirmed"
                );
                ActionOutcome::succeeded(OutcomeKind::Confirmed, tx)
            }
            Err(e @ AgentError::ExecutionReverted { .. }) => {
                warn!(tx_hash = %tx.hash, "Transaction reverted, re-evaluating next tick");
                ActionOutcome::failed(OutcomeKind::Reverted, Some(tx), e)
            }
            Err(e) => {
                warn!(tx_hash = %tx.hash, error = %e, "Transaction outcome unknown");
                ActionOutcome::failed(OutcomeKind::Unconfirmed, Some(tx), e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
