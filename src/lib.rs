//! Auction operator: bids for management rights on auction-managed pools
//! and tunes the swap fee while it holds them.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod chain;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod strategy;
pub mod types;
