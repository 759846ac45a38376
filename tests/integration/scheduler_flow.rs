//! End-to-end pool worker cycles against the in-memory auction.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use auction_operator::chain::AuctionContract;
use auction_operator::engine::scheduler::CyclePhase;
use auction_operator::engine::{
    ActionExecutor, AuctionReader, CycleStatus, ExecutorConfig, PoolWorker, ShutdownPolicy, WorkerConfig,
};
use auction_operator::error::AgentError;
use auction_operator::estimator::StaticEstimator;
use auction_operator::strategy::DecisionParams;
use auction_operator::types::{Action, AuctionRules, AuctionState, OutcomeKind, PoolId, PoolKey};

use crate::mock_chain::{MockChain, ReceiptMode};

/// 0.002 ETH expected profit per block.
const PROFIT: Decimal = dec!(2_000_000_000_000_000);
/// 80% of `PROFIT`.
const AFFORDABLE: Decimal = dec!(1_600_000_000_000_000);

fn operator() -> Address {
    Address::repeat_byte(0x0a)
}

fn pool() -> PoolId {
    PoolId(B256::repeat_byte(0x11))
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

struct Harness {
    chain: Arc<MockChain>,
    exec: ExecutorConfig,
    worker: WorkerConfig,
}

impl Harness {
    fn new() -> Self {
        let chain = Arc::new(MockChain::new(operator(), AuctionRules::default()));
        chain.set_auction(pool(), AuctionState::unmanaged(3000));
        Self {
            chain,
            exec: ExecutorConfig::default(),
            worker: WorkerConfig {
                poll_interval: Duration::from_millis(20),
                ..WorkerConfig::default()
            },
        }
    }

    fn build(&self) -> PoolWorker {
        let chain: Arc<dyn AuctionContract> = self.chain.clone();
        PoolWorker::new(
            pool(),
            AuctionReader::new(chain.clone()),
            Arc::new(StaticEstimator::new(PROFIT, dec!(0.02))),
            ActionExecutor::new(chain, pool_key(), AuctionRules::default(), self.exec.clone()),
            DecisionParams::for_operator(operator()),
            self.worker.clone(),
        )
    }
}

#[tokio::test]
async fn test_unmanaged_pool_bid_is_submitted_and_confirmed() {
    let h = Harness::new();
    let worker = h.build();

    let report = worker.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.status, CycleStatus::Completed);
    assert_eq!(report.reason.as_deref(), Some("outbid"));
    assert_eq!(report.action, Action::SubmitBid { rent_per_block: AFFORDABLE });
    assert_eq!(report.outcome.kind, OutcomeKind::Confirmed);
    assert_eq!(report.manager.as_deref(), Some("none"));

    let pending = h.chain.pending(pool()).expect("bid should be pending");
    assert_eq!(pending.bidder, operator());
    assert_eq!(pending.rent_per_block, AFFORDABLE);
    assert_eq!(pending.deposit, AFFORDABLE * Decimal::from(100));
    assert_eq!(pending.activation_block, 1_005);
    assert_eq!(h.chain.history_len(pool()), 1);
    assert_eq!(worker.cycle_state().phase(), CyclePhase::Idle);
}

#[tokio::test]
async fn test_own_pending_bid_is_not_outbid_at_same_valuation() {
    let h = Harness::new();
    let worker = h.build();
    let token = CancellationToken::new();

    worker.run_cycle(&token).await;
    h.chain.advance_blocks(1);
    let second = worker.run_cycle(&token).await;

    assert_eq!(second.reason.as_deref(), Some("outpriced"));
    assert_eq!(second.action, Action::NoAction);
    assert_eq!(second.pending_rent, Some(AFFORDABLE));
    assert_eq!(h.chain.bids_submitted(), 1);
}

#[tokio::test]
async fn test_manager_reprices_fee_once() {
    let h = Harness::new();
    h.chain.set_auction(
        pool(),
        AuctionState {
            current_manager: Some(operator()),
            rent_per_block: AFFORDABLE,
            manager_deposit: AFFORDABLE * Decimal::from(200),
            last_rent_block: 990,
            current_fee: 3000,
            total_rent_paid: Decimal::ZERO,
        },
    );
    let worker = h.build();
    let token = CancellationToken::new();

    let first = worker.run_cycle(&token).await;
    assert_eq!(first.manager.as_deref(), Some("self"));
    assert_eq!(first.action, Action::SetFee { fee: 3200 });
    assert_eq!(first.outcome.kind, OutcomeKind::Confirmed);
    assert_eq!(first.rent_owed, Some(AFFORDABLE * Decimal::from(10)));
    assert_eq!(first.deposit_runway_blocks, Some(190));

    let second = worker.run_cycle(&token).await;
    assert_eq!(second.reason.as_deref(), Some("fee_held"));
    assert_eq!(second.action, Action::NoAction);
    assert_eq!(h.chain.fees_set(), vec![3200]);
}

#[tokio::test]
async fn test_overlapping_cycle_is_skipped() {
    let h = Harness::new();
    h.chain.set_receipt_mode(ReceiptMode::Slow(Duration::from_millis(150)));
    let worker = h.build();
    let token = CancellationToken::new();

    let (first, second) = tokio::join!(worker.run_cycle(&token), worker.run_cycle(&token));

    assert_eq!(first.status, CycleStatus::Completed);
    assert_eq!(first.outcome.kind, OutcomeKind::Confirmed);
    assert_eq!(second.status, CycleStatus::Skipped);
    assert_eq!(second.action, Action::NoAction);
    assert_eq!(h.chain.bids_submitted(), 1);
}

#[tokio::test]
async fn test_unmined_bid_blocks_new_submissions_until_receipt() {
    let mut h = Harness::new();
    h.exec.confirmation_timeout = Duration::from_millis(30);
    h.chain.set_apply_bids(false);
    h.chain.set_receipt_mode(ReceiptMode::Never);
    let worker = h.build();
    let token = CancellationToken::new();

    let first = worker.run_cycle(&token).await;
    assert_eq!(first.outcome.kind, OutcomeKind::Unconfirmed);
    assert!(matches!(
        first.outcome.error,
        Some(AgentError::ConfirmationTimeout { .. })
    ));
    assert_eq!(worker.cycle_state().phase(), CyclePhase::AwaitingConfirmation);

    let second = worker.run_cycle(&token).await;
    assert_eq!(second.status, CycleStatus::AwaitingReceipt);
    assert_eq!(second.action, Action::NoAction);
    assert_eq!(h.chain.bids_submitted(), 1);

    h.chain.set_receipt_mode(ReceiptMode::Success);
    let third = worker.run_cycle(&token).await;
    assert_eq!(third.status, CycleStatus::Settled);
    assert_eq!(third.outcome.kind, OutcomeKind::Confirmed);
    assert_eq!(worker.cycle_state().phase(), CyclePhase::Idle);
    assert_eq!(h.chain.bids_submitted(), 1);
    assert_eq!(h.chain.receipts_requested(), 3);
}

#[tokio::test]
async fn test_reverted_bid_is_reported() {
    let h = Harness::new();
    h.chain.set_receipt_mode(ReceiptMode::Revert);
    let worker = h.build();

    let report = worker.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.outcome.kind, OutcomeKind::Reverted);
    assert!(report.outcome.is_failure());
}

#[tokio::test]
async fn test_abandon_policy_stops_waiting_on_shutdown() {
    let mut h = Harness::new();
    h.worker.shutdown_policy = ShutdownPolicy::Abandon;
    h.chain.set_receipt_mode(ReceiptMode::Never);
    let worker = h.build();
    let token = CancellationToken::new();

    let (report, _) = tokio::join!(worker.run_cycle(&token), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    assert_eq!(report.outcome.kind, OutcomeKind::Abandoned);
    assert!(report.outcome.tx.is_some());
    assert_eq!(h.chain.receipts_requested(), 1);
}

#[tokio::test]
async fn test_read_failure_recovers_next_cycle() {
    let h = Harness::new();
    h.chain.set_fail_reads(true);
    let worker = h.build();
    let token = CancellationToken::new();

    let failed = worker.run_cycle(&token).await;
    assert_eq!(failed.status, CycleStatus::ReadFailed);
    assert_eq!(failed.warnings.len(), 1);
    assert_eq!(h.chain.bids_submitted(), 0);

    h.chain.set_fail_reads(false);
    let recovered = worker.run_cycle(&token).await;
    assert_eq!(recovered.status, CycleStatus::Completed);
    assert_eq!(recovered.outcome.kind, OutcomeKind::Confirmed);
}

#[tokio::test]
async fn test_dry_run_never_touches_chain() {
    let mut h = Harness::new();
    h.exec.dry_run = true;
    let worker = h.build();

    let report = worker.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.outcome.kind, OutcomeKind::DryRun);
    assert!(report.outcome.tx.as_ref().is_some_and(|tx| tx.dry_run));
    assert_eq!(h.chain.bids_submitted(), 0);
    assert_eq!(h.chain.receipts_requested(), 0);
}

#[tokio::test]
async fn test_run_loop_publishes_reports_until_cancelled() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::channel(64);
    let worker = Arc::new(h.build().with_reports(tx));
    let token = CancellationToken::new();

    let handle = {
        let worker = worker.clone();
        let token = token.clone();
        tokio::spawn(async move { worker.run(token).await })
    };

    tokio::time::sleep(Duration::from_millis(120)).await;
    token.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker should stop after cancellation")
        .expect("worker task panicked");

    let mut reports = Vec::new();
    while let Ok(report) = rx.try_recv() {
        reports.push(report);
    }
    assert!(reports.len() >= 2);
    assert_eq!(reports[0].cycle, 1);
    assert_eq!(reports[0].outcome.kind, OutcomeKind::Confirmed);
    assert_eq!(h.chain.bids_submitted(), 1);
}
