//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>` and
//! fed by the pool workers' cycle reports.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::scheduler::{CycleReport, CycleStatus};
use crate::types::{AuctionRules, OutcomeKind, PendingBid, PoolId};

/// Reports kept per pool.
const MAX_CYCLES_PER_POOL: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct PoolEntry {
    label: String,
    bid_history_len: Option<usize>,
    latest_bid: Option<PendingBid>,
    cycles: VecDeque<CycleReport>,
}

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub agent_name: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub operator: RwLock<Option<String>>,
    pub rules: RwLock<Option<AuctionRules>>,
    pools: RwLock<BTreeMap<String, PoolEntry>>,
}

impl DashboardState {
    pub fn new(agent_name: impl Into<String>, dry_run: bool) -> Self {
        Self {
            agent_name: agent_name.into(),
            dry_run,
            started_at: Utc::now(),
            operator: RwLock::new(None),
            rules: RwLock::new(None),
            pools: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn register_pool(&self, pool: PoolId, label: impl Into<String>) {
        let mut pools = self.pools.write().await;
        pools.entry(pool.to_string()).or_default().label = label.into();
    }

    pub async fn set_bid_history(&self, pool: PoolId, len: usize, latest: Option<PendingBid>) {
        let mut pools = self.pools.write().await;
        let entry = pools.entry(pool.to_string()).or_default();
        entry.bid_history_len = Some(len);
        entry.latest_bid = latest;
    }

    /// Append a cycle report, keeping the most recent ones.
    pub async fn record(&self, report: CycleReport) {
        let mut pools = self.pools.write().await;
        let entry = pools.entry(report.pool.to_string()).or_default();
        if entry.cycles.len() == MAX_CYCLES_PER_POOL {
            entry.cycles.pop_front();
        }
        entry.cycles.push_back(report);
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub agent: String,
    pub operator: Option<String>,
    pub dry_run: bool,
    pub uptime_secs: i64,
    pub pools: usize,
    pub rules: Option<AuctionRules>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub pool: String,
    pub label: String,
    pub cycles_recorded: usize,
    pub transactions_confirmed: usize,
    pub failures: usize,
    pub bid_history_len: Option<usize>,
    pub latest_bid: Option<PendingBid>,
    pub last_cycle: Option<CycleReport>,
}

fn summarize(pool: &str, entry: &PoolEntry) -> PoolSummary {
    PoolSummary {
        pool: pool.to_string(),
        label: entry.label.clone(),
        cycles_recorded: entry.cycles.len(),
        transactions_confirmed: entry
            .cycles
            .iter()
            .filter(|c| c.outcome.kind == OutcomeKind::Confirmed)
            .count(),
        failures: entry
            .cycles
            .iter()
            .filter(|c| c.status == CycleStatus::ReadFailed || c.outcome.is_failure())
            .count(),
        bid_history_len: entry.bid_history_len,
        latest_bid: entry.latest_bid.clone(),
        last_cycle: entry.cycles.back().cloned(),
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let pools = state.pools.read().await.len();
    Json(StatusResponse {
        agent: state.agent_name.clone(),
        operator: state.operator.read().await.clone(),
        dry_run: state.dry_run,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        pools,
        rules: state.rules.read().await.clone(),
    })
}

/// GET /api/pools
pub async fn get_pools(State(state): State<AppState>) -> Json<Vec<PoolSummary>> {
    let pools = state.pools.read().await;
    Json(pools.iter().map(|(id, entry)| summarize(id, entry)).collect())
}

/// GET /api/pools/:id/cycles
pub async fn get_pool_cycles(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CycleReport>>, StatusCode> {
    let pool = PoolId::from_str(&id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let pools = state.pools.read().await;
    let entry = pools.get(&pool.to_string()).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(entry.cycles.iter().cloned().collect()))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
