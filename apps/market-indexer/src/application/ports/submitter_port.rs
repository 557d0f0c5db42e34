//! Transaction Submitter Port (Driven Port)
//!
//! Invokes named state-mutating operations of the market program.

use async_trait::async_trait;

/// Transaction submission error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    /// Transport-level failure talking to the ledger node.
    #[error("submit network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The node rejected the transaction.
    #[error("transaction rejected ({code}): {message}")]
    Rejected {
        /// RPC error code.
        code: i64,
        /// Rejection reason.
        message: String,
    },

    /// Transaction could not be built or signed.
    #[error("failed to build transaction: {0}")]
    Build(String),
}

/// Port for submitting program operations.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Invoke `operation`, returning the transaction signature on success.
    async fn invoke(&self, operation: &str) -> Result<String, SubmitError>;
}
