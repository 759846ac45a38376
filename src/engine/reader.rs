//! Auction state reader.
//!
//! Every call is a fresh snapshot: auction state, pending bid and block
//! height are read concurrently and nothing is cached between cycles.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::chain::AuctionContract;
use crate::error::AgentError;
use crate::types::{AuctionSnapshot, BidHistory, PoolId};

fn as_read_error(err: AgentError) -> AgentError {
    match err {
        AgentError::ChainRead(_) => err,
        other => AgentError::ChainRead(other.to_string()),
    }
}

pub struct AuctionReader {
    chain: Arc<dyn AuctionContract>,
}

impl AuctionReader {
    pub fn new(chain: Arc<dyn AuctionContract>) -> Self {
        Self { chain }
    }

    /// Read one consistent-enough snapshot of a pool's auction.
    pub async fn fetch(&self, pool: PoolId) -> Result<AuctionSnapshot, AgentError> {
        let (state, pending, block) = tokio::try_join!(
            self.chain.read_auction_state(pool),
            self.chain.read_pending_bid(pool),
            self.chain.block_number(),
        )
        .map_err(as_read_error)?;

        debug!(
            pool = %pool.short(),
            block,
            state = %state,
            pending = pending.is_some(),
            "Auction snapshot fetched"
        );

        Ok(AuctionSnapshot {
            pool,
            state,
            pending,
            block,
            fetched_at: Utc::now(),
        })
    }

    pub async fn fetch_bid_history(&self, pool: PoolId) -> Result<BidHistory, AgentError> {
        self.chain.read_bid_history(pool).await.map_err(as_read_error)
    }
}
