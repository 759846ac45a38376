//! Error taxonomy for the operator core.
//!
//! Every failure a cycle can hit maps onto one of these variants, and the
//! variant alone decides what the scheduler does next: skip the tick,
//! retry on the next one, or log the outcome and move on. None of them
//! stop a worker.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Transport or decoding failure while reading chain state.
    #[error("Chain read failed: {0}")]
    ChainRead(String),

    /// The profitability source could not produce an estimate.
    #[error("Estimation failed: {0}")]
    Estimation(String),

    /// The estimate exists but is older than the configured maximum age.
    #[error("Estimate is stale: {age_secs}s old (max {max_age_secs}s)")]
    StaleEstimate { age_secs: i64, max_age_secs: i64 },

    /// Local parameter or invariant failure before anything was broadcast.
    #[error("Failed to build transaction: {0}")]
    Build(String),

    /// Signing or broadcast failure. No chain state was mutated.
    #[error("Transaction submission failed: {0}")]
    Submission(String),

    /// The transaction was mined but its receipt reports failure.
    #[error("Transaction {tx_hash} reverted on-chain")]
    ExecutionReverted { tx_hash: String },

    /// No receipt arrived within the confirmation window.
    #[error("No receipt for {tx_hash} after {waited_secs}s")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Whether the same opportunity may be attempted again on the next tick.
    ///
    /// Build failures are the only terminal kind: re-deriving the action from
    /// fresh state next cycle is fine, but the malformed action itself is not
    /// retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AgentError::Build(_) | AgentError::Config(_))
    }

    /// Short machine-friendly label used in structured logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ChainRead(_) => "chain_read",
            AgentError::Estimation(_) => "estimation",
            AgentError::StaleEstimate { .. } => "stale_estimate",
            AgentError::Build(_) => "build",
            AgentError::Submission(_) => "submission",
            AgentError::ExecutionReverted { .. } => "reverted",
            AgentError::ConfirmationTimeout { .. } => "confirmation_timeout",
            AgentError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_errors_are_terminal() {
        assert!(!AgentError::Build("zero rent".into()).is_retryable());
        assert!(!AgentError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(AgentError::ChainRead("timeout".into()).is_retryable());
        assert!(AgentError::Submission("nonce too low".into()).is_retryable());
        assert!(AgentError::ExecutionReverted { tx_hash: "0xab".into() }.is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = AgentError::StaleEstimate { age_secs: 90, max_age_secs: 60 };
        assert_eq!(err.to_string(), "Estimate is stale: 90s old (max 60s)");
        assert_eq!(err.kind(), "stale_estimate");
    }
}
