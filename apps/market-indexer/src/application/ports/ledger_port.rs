//! Ledger Reader Port (Driven Port)
//!
//! Read-only access to ledger progress and market account state.

use async_trait::async_trait;

use crate::domain::{Address, MarketAccount};

/// Ledger read error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// Transport-level failure talking to the ledger node.
    #[error("ledger network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The node answered with an error object.
    #[error("ledger RPC error {code}: {message}")]
    Rpc {
        /// RPC error code.
        code: i64,
        /// RPC error message.
        message: String,
    },

    /// The requested account does not exist.
    #[error("account not found: {address}")]
    AccountNotFound {
        /// Address that was looked up.
        address: String,
    },

    /// Account data could not be decoded.
    #[error("failed to decode account data: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

/// Port for reading ledger state.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Current ledger slot.
    async fn current_slot(&self) -> Result<u64, LedgerError>;

    /// Read and decode the market account at `address`.
    async fn read_market(&self, address: &Address) -> Result<MarketAccount, LedgerError>;
}
