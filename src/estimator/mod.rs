//! Profitability signals.
//!
//! Defines the `ProfitabilityEstimator` trait consumed by the pool worker
//! and `StaticEstimator`, a constant source used until a real analytics
//! feed is plugged in. `resolve_estimate` turns whatever the source
//! returned (fresh, stale, or failed) into the single estimate a cycle
//! decides on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::AgentError;
use crate::types::{AuctionState, ExpectedProfit, PoolId, Wei};

/// Source of expected-profit and volatility signals for a pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfitabilityEstimator: Send + Sync {
    async fn estimate(&self, pool: PoolId, state: &AuctionState) -> Result<ExpectedProfit, AgentError>;

    /// Identifier for logs.
    fn name(&self) -> &'static str;
}

/// Fixed profit and volatility, re-stamped on every call.
#[derive(Debug, Clone)]
pub struct StaticEstimator {
    profit_per_block: Wei,
    volatility: Decimal,
}

impl StaticEstimator {
    pub fn new(profit_per_block: Wei, volatility: Decimal) -> Self {
        Self {
            profit_per_block,
            volatility,
        }
    }
}

#[async_trait]
impl ProfitabilityEstimator for StaticEstimator {
    async fn estimate(&self, _pool: PoolId, _state: &AuctionState) -> Result<ExpectedProfit, AgentError> {
        Ok(ExpectedProfit::new(self.profit_per_block, self.volatility))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Reject estimates older than `max_age_secs`.
pub fn check_freshness(
    estimate: &ExpectedProfit,
    now: DateTime<Utc>,
    max_age_secs: i64,
) -> Result<(), AgentError> {
    let age_secs = estimate.age_secs(now);
    if age_secs > max_age_secs {
        return Err(AgentError::StaleEstimate { age_secs, max_age_secs });
    }
    Ok(())
}

/// Fetch an estimate and degrade it instead of failing the cycle.
///
/// An estimation error yields a zero estimate. A stale estimate keeps its
/// volatility but loses its profit, so it can still drive fee re-pricing
/// and never a bid. The error, if any, is returned alongside for the
/// cycle report.
pub async fn resolve_estimate(
    estimator: &dyn ProfitabilityEstimator,
    pool: PoolId,
    state: &AuctionState,
    max_age_secs: i64,
) -> (ExpectedProfit, Option<AgentError>) {
    match estimator.estimate(pool, state).await {
        Ok(estimate) => match check_freshness(&estimate, Utc::now(), max_age_secs) {
            Ok(()) => (estimate, None),
            Err(err) => {
                warn!(pool = %pool.short(), estimator = estimator.name(), error = %err, "Discarding stale profit");
                (estimate.without_profit(), Some(err))
            }
        },
        Err(err) => {
            warn!(pool = %pool.short(), estimator = estimator.name(), error = %err, "Estimator failed, assuming zero profit");
            (ExpectedProfit::zero(), Some(err))
        }
    }
}
