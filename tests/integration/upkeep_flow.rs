//! Fee withdrawal and wallet checks against the in-memory auction.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use auction_operator::chain::AuctionContract;
use auction_operator::engine::upkeep::WithdrawalOutcome;
use auction_operator::engine::{BalanceMonitor, FeeWithdrawer, WithdrawalConfig};
use auction_operator::types::{AuctionRules, AuctionState, PoolId, PoolKey};

use crate::mock_chain::MockChain;

fn operator() -> Address {
    Address::repeat_byte(0x0a)
}

fn pool() -> PoolId {
    PoolId(B256::repeat_byte(0x22))
}

fn pool_key() -> PoolKey {
    PoolKey {
        currency0: Address::ZERO,
        currency1: Address::repeat_byte(1),
        fee: 3000,
        tick_spacing: 60,
        hooks: Address::repeat_byte(2),
    }
}

fn chain() -> Arc<MockChain> {
    let chain = Arc::new(MockChain::new(operator(), AuctionRules::default()));
    chain.set_auction(pool(), AuctionState::unmanaged(3000));
    chain
}

fn withdrawer(chain: &Arc<MockChain>, config: WithdrawalConfig) -> FeeWithdrawer {
    let chain: Arc<dyn AuctionContract> = chain.clone();
    FeeWithdrawer::new(chain, pool(), pool_key(), config)
}

#[tokio::test]
async fn test_fees_withdrawn_once_worth_the_gas() {
    let chain = chain();
    let w = withdrawer(&chain, WithdrawalConfig::default());

    // 10 gwei * 100k gas * 2 = 0.002 ETH
    chain.set_manager_fees(dec!(1_000_000_000_000_000));
    assert!(matches!(w.check_once().await, WithdrawalOutcome::BelowGasCost { .. }));
    assert_eq!(chain.withdrawals(), 0);

    chain.set_manager_fees(dec!(2_500_000_000_000_000));
    assert!(matches!(w.check_once().await, WithdrawalOutcome::Withdrawn { .. }));
    assert_eq!(chain.withdrawals(), 1);

    assert_eq!(w.check_once().await, WithdrawalOutcome::NothingAccrued);
    assert_eq!(chain.withdrawals(), 1);
}

#[tokio::test]
async fn test_withdrawer_loop_runs_until_cancelled() {
    let chain = chain();
    chain.set_manager_fees(dec!(5_000_000_000_000_000));
    let w = Arc::new(withdrawer(
        &chain,
        WithdrawalConfig {
            interval: Duration::from_millis(20),
            ..WithdrawalConfig::default()
        },
    ));
    let token = CancellationToken::new();

    let handle = {
        let w = w.clone();
        let token = token.clone();
        tokio::spawn(async move { w.run(token).await })
    };
    tokio::time::sleep(Duration::from_millis(80)).await;
    token.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("withdrawer should stop after cancellation")
        .expect("withdrawer task panicked");

    assert_eq!(chain.withdrawals(), 1);
}

#[tokio::test]
async fn test_balance_monitor_reads_operator_wallet() {
    let chain = chain();
    let dyn_chain: Arc<dyn AuctionContract> = chain.clone();

    let healthy = BalanceMonitor::new(dyn_chain.clone(), Duration::from_secs(60), dec!(100_000_000_000_000_000));
    let check = healthy.check_once().await.unwrap();
    assert_eq!(check.balance, dec!(1_000_000_000_000_000_000));
    assert!(!check.low);

    let strict = BalanceMonitor::new(dyn_chain, Duration::from_secs(60), dec!(2_000_000_000_000_000_000));
    assert!(strict.check_once().await.unwrap().low);

    chain.set_fail_reads(true);
    assert!(healthy.check_once().await.is_err());
}
