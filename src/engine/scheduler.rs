//! Per-pool polling scheduler.
//!
//! Each pool gets its own `PoolWorker` running on its own task. A worker
//! ticks on a fixed interval, and every tick runs one cycle:
//! fetch → estimate → decide → execute → await confirmation.
//!
//! The cycle phase is owned by the worker (`CycleState`). At most one
//! cycle runs per pool; an attempt to start a second one is reported as
//! skipped. A transaction whose receipt outlives the confirmation timeout
//! stays parked, and later ticks only poll it until it is mined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::executor::ActionExecutor;
use super::reader::AuctionReader;
use crate::error::AgentError;
use crate::estimator::{resolve_estimate, ProfitabilityEstimator};
use crate::strategy::{explain, manager_role, DecisionParams};
use crate::types::{
    short_address, wei_to_eth, Action, ActionOutcome, BidHistory, OutcomeKind, PoolId, TxHandle, Wei,
};

// ---------------------------------------------------------------------------
// Cycle state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Deciding,
    Executing,
    AwaitingConfirmation,
}

#[derive(Debug)]
struct Slot {
    phase: CyclePhase,
    /// A cycle currently holds the slot.
    active: bool,
    /// Broadcast transaction whose receipt has not been seen yet.
    outstanding: Option<TxHandle>,
}

/// Phase of the current cycle for one pool.
///
/// A broadcast transaction that outlives its cycle stays parked here and
/// keeps the pool in `AwaitingConfirmation` until its receipt is seen.
#[derive(Debug)]
pub struct CycleState {
    slot: Mutex<Slot>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot {
                phase: CyclePhase::Idle,
                active: false,
                outstanding: None,
            }),
        }
    }
}

impl CycleState {
    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn phase(&self) -> CyclePhase {
        self.lock().phase
    }

    /// The parked transaction, if any.
    pub fn outstanding(&self) -> Option<TxHandle> {
        self.lock().outstanding.clone()
    }

    /// Claim the slot. `None` if a cycle is already running.
    ///
    /// A fresh cycle starts in `Fetching`; with a parked transaction it
    /// resumes in `AwaitingConfirmation` instead.
    pub fn try_begin(&self) -> Option<CycleGuard<'_>> {
        let mut slot = self.lock();
        if slot.active {
            return None;
        }
        slot.active = true;
        slot.phase = if slot.outstanding.is_some() {
            CyclePhase::AwaitingConfirmation
        } else {
            CyclePhase::Fetching
        };
        Some(CycleGuard { state: self })
    }

    fn set(&self, next: CyclePhase) {
        self.lock().phase = next;
    }
}

/// Holds the pool's cycle slot. Dropping it returns the pool to `Idle`,
/// or to `AwaitingConfirmation` while a transaction is parked.
pub struct CycleGuard<'a> {
    state: &'a CycleState,
}

impl CycleGuard<'_> {
    pub fn advance(&self, next: CyclePhase) {
        self.state.set(next);
    }

    /// Keep `tx` outstanding past the end of this cycle.
    pub fn park(&self, tx: TxHandle) {
        self.state.lock().outstanding = Some(tx);
    }

    /// Take the parked transaction, if any.
    pub fn take_outstanding(&self) -> Option<TxHandle> {
        self.state.lock().outstanding.take()
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.state.lock();
        slot.active = false;
        slot.phase = if slot.outstanding.is_some() {
            CyclePhase::AwaitingConfirmation
        } else {
            CyclePhase::Idle
        };
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do with an outstanding confirmation wait on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Keep waiting (up to the confirmation timeout) before exiting.
    #[default]
    CompleteInFlight,
    /// Stop waiting immediately; the transaction may still land.
    Abandon,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub max_estimate_age_secs: i64,
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(12),
            max_estimate_age_secs: 60,
            shutdown_policy: ShutdownPolicy::CompleteInFlight,
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Completed,
    /// Another cycle for this pool was still in flight.
    Skipped,
    /// The auction snapshot could not be read.
    ReadFailed,
    /// A transaction from an earlier cycle is still unmined; nothing was fetched.
    AwaitingReceipt,
    /// The transaction from an earlier cycle was resolved this tick.
    Settled,
}

/// Summary of one cycle, logged and published to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub pool: PoolId,
    pub cycle: u64,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub block: Option<u64>,
    pub manager: Option<String>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub current_rent: Option<Wei>,
    pub current_fee: Option<u32>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub pending_rent: Option<Wei>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub rent_owed: Option<Wei>,
    pub deposit_runway_blocks: Option<u64>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub expected_profit: Option<Wei>,
    pub volatility: Option<rust_decimal::Decimal>,
    pub reason: Option<String>,
    pub action: Action,
    pub outcome: ActionOutcome,
    /// Non-fatal problems seen during the cycle (read or estimate errors).
    pub warnings: Vec<String>,
}

impl CycleReport {
    fn empty(pool: PoolId, cycle: u64, status: CycleStatus, started_at: DateTime<Utc>) -> Self {
        Self {
            pool,
            cycle,
            status,
            started_at,
            duration_ms: 0,
            block: None,
            manager: None,
            current_rent: None,
            current_fee: None,
            pending_rent: None,
            rent_owed: None,
            deposit_runway_blocks: None,
            expected_profit: None,
            volatility: None,
            reason: None,
            action: Action::NoAction,
            outcome: ActionOutcome::idle(),
            warnings: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        let elapsed = Utc::now() - self.started_at;
        self.duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);
        self
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct PoolWorker {
    pool: PoolId,
    reader: AuctionReader,
    estimator: Arc<dyn ProfitabilityEstimator>,
    executor: ActionExecutor,
    params: DecisionParams,
    config: WorkerConfig,
    cycle: CycleState,
    cycles_started: AtomicU64,
    reports: Option<mpsc::Sender<CycleReport>>,
}

impl PoolWorker {
    pub fn new(
        pool: PoolId,
        reader: AuctionReader,
        estimator: Arc<dyn ProfitabilityEstimator>,
        executor: ActionExecutor,
        params: DecisionParams,
        config: WorkerConfig,
    ) -> Self {
        Self {
            pool,
            reader,
            estimator,
            executor,
            params,
            config,
            cycle: CycleState::default(),
            cycles_started: AtomicU64::new(0),
            reports: None,
        }
    }

    /// Publish every cycle report on `tx`.
    pub fn with_reports(mut self, tx: mpsc::Sender<CycleReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn cycle_state(&self) -> &CycleState {
        &self.cycle
    }

    /// Log the pool's bid history. Failures are logged and ignored.
    pub async fn audit_history(&self) -> Option<BidHistory> {
        match self.reader.fetch_bid_history(self.pool).await {
            Ok(history) => {
                match history.latest() {
                    Some(last) => info!(
                        pool = %self.pool.short(),
                        bids = history.len(),
                        latest_bidder = %short_address(&last.bidder),
                        latest_rent = %last.rent_per_block,
                        "Bid history loaded"
                    ),
                    None => info!(pool = %self.pool.short(), "No bids recorded for pool yet"),
                }
                Some(history)
            }
            Err(e) => {
                warn!(pool = %self.pool.short(), error = %e, "Could not read bid history");
                None
            }
        }
    }

    /// Run one full cycle, unless one is already in flight.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> CycleReport {
        let started_at = Utc::now();
        let pool = self.pool.short();

        let Some(guard) = self.cycle.try_begin() else {
            warn!(pool = %pool, phase = ?self.cycle.phase(), "Previous cycle still in flight, skipping tick");
            return CycleReport::empty(self.pool, 0, CycleStatus::Skipped, started_at);
        };
        let cycle = self.cycles_started.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = CycleReport::empty(self.pool, cycle, CycleStatus::Completed, started_at);

        // -- Outstanding transaction -----------------------------------------

        if let Some(tx) = guard.take_outstanding() {
            let outcome = self.confirm(tx, shutdown, &guard).await;
            report.status = if self.cycle.outstanding().is_some() {
                CycleStatus::AwaitingReceipt
            } else {
                CycleStatus::Settled
            };
            info!(
                pool = %pool,
                cycle,
                status = ?report.status,
                outcome = ?outcome.kind,
                "Checked outstanding transaction"
            );
            report.outcome = outcome;
            return report.finish();
        }

        // -- Fetch ------------------------------------------------------------

        let snapshot = match self.reader.fetch(self.pool).await {
            Ok(s) => s,
            Err(e) => {
                warn!(pool = %pool, cycle, error = %e, "Auction read failed, retrying next tick");
                report.status = CycleStatus::ReadFailed;
                report.warnings.push(e.to_string());
                return report.finish();
            }
        };

        report.block = Some(snapshot.block);
        report.manager = Some(manager_role(&snapshot.state, &self.params.operator));
        report.current_rent = Some(snapshot.state.rent_per_block);
        report.current_fee = Some(snapshot.state.current_fee);
        report.pending_rent = snapshot.pending.as_ref().map(|p| p.rent_per_block);
        report.rent_owed = Some(snapshot.rent_owed());
        report.deposit_runway_blocks = snapshot.deposit_runway();

        if let Some(pending) = &snapshot.pending {
            info!(
                pool = %pool,
                bidder = %short_address(&pending.bidder),
                rent = %pending.rent_per_block,
                activation_block = pending.activation_block,
                blocks_left = pending.blocks_until_activation(snapshot.block),
                activatable = pending.is_activatable_at(snapshot.block),
                "Pending bid"
            );
        }

        // -- Decide -----------------------------------------------------------

        guard.advance(CyclePhase::Deciding);
        let (estimate, estimate_err) = resolve_estimate(
            self.estimator.as_ref(),
            self.pool,
            &snapshot.state,
            self.config.max_estimate_age_secs,
        )
        .await;
        if let Some(e) = estimate_err {
            report.warnings.push(e.to_string());
        }
        report.expected_profit = Some(estimate.profit_per_block);
        report.volatility = Some(estimate.volatility);

        let record = explain(&snapshot.state, snapshot.pending.as_ref(), &estimate, &self.params);
        let action = record.action();
        debug!(pool = %pool, cycle, decision = %record, "Decision");
        report.reason = Some(record.reason().to_string());
        report.action = action.clone();

        // -- Execute ----------------------------------------------------------

        guard.advance(CyclePhase::Executing);
        let mut outcome = self.executor.execute(&action, &snapshot).await;

        if outcome.kind == OutcomeKind::Submitted {
            if let Some(tx) = outcome.tx.clone() {
                guard.advance(CyclePhase::AwaitingConfirmation);
                outcome = self.confirm(tx, shutdown, &guard).await;
            }
        }
        report.outcome = outcome;

        let report = report.finish();
        info!(
            pool = %pool,
            cycle,
            block = snapshot.block,
            manager = report.manager.as_deref().unwrap_or("none"),
            rent_eth = %wei_to_eth(snapshot.state.rent_per_block).normalize(),
            fee = snapshot.state.current_fee,
            profit = %estimate.profit_per_block,
            reason = record.reason(),
            action = %report.action,
            outcome = ?report.outcome.kind,
            duration_ms = report.duration_ms,
            "Cycle complete"
        );
        drop(guard);
        report
    }

    /// Wait for `tx`'s receipt. A timed-out wait parks the transaction so
    /// later ticks keep polling it instead of starting a new cycle.
    async fn confirm(&self, tx: TxHandle, shutdown: &CancellationToken, guard: &CycleGuard<'_>) -> ActionOutcome {
        let outcome = match self.config.shutdown_policy {
            ShutdownPolicy::CompleteInFlight => {
                let result = self.executor.await_confirmation(&tx).await;
                ActionExecutor::settle(tx, result)
            }
            ShutdownPolicy::Abandon => {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        warn!(pool = %self.pool.short(), tx_hash = %tx.hash, "Shutdown: abandoning confirmation wait");
                        ActionOutcome {
                            kind: OutcomeKind::Abandoned,
                            tx: Some(tx.clone()),
                            error: None,
                        }
                    }
                    result = self.executor.await_confirmation(&tx) => ActionExecutor::settle(tx.clone(), result),
                }
            }
        };

        if matches!(outcome.error, Some(AgentError::ConfirmationTimeout { .. })) {
            if let Some(tx) = &outcome.tx {
                warn!(pool = %self.pool.short(), tx_hash = %tx.hash, "Receipt still pending, holding pool until mined");
                guard.park(tx.clone());
            }
        }
        outcome
    }

    fn publish(&self, report: CycleReport) {
        if let Some(tx) = &self.reports {
            if let Err(e) = tx.try_send(report) {
                debug!(pool = %self.pool.short(), error = %e, "Dropped cycle report");
            }
        }
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// Late ticks are skipped, never queued. Cancellation is observed
    /// between cycles and, depending on the shutdown policy, during the
    /// confirmation wait.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            pool = %self.pool.short(),
            interval_secs = self.config.poll_interval.as_secs(),
            dry_run = self.executor.is_dry_run(),
            "Pool worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(pool = %self.pool.short(), "Pool worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.run_cycle(&shutdown).await;
                    self.publish(report);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
