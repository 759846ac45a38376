//! Integration tests: pool workers driven against an in-memory auction.

mod mock_chain;
mod scheduler_flow;
mod upkeep_flow;
