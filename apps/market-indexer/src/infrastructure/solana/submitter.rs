//! Transaction submitter over JSON-RPC.
//!
//! Each invocation fetches a fresh blockhash, signs a single-instruction
//! transaction and sends it with preflight at `confirmed` commitment. A
//! returned signature means the node accepted the transaction; inclusion is
//! not awaited.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;

use super::rpc::{RpcClient, RpcError};
use super::transaction::{Instruction, sign_transaction};
use crate::application::ports::{SubmitError, TransactionSubmitter};
use crate::domain::Address;

impl From<RpcError> for SubmitError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Network(message) | RpcError::Decode(message) => Self::Network { message },
            RpcError::Rpc { code, message } => Self::Rejected { code, message },
        }
    }
}

/// Signs and submits market program operations.
pub struct RpcTransactionSubmitter {
    rpc: RpcClient,
    program_id: Address,
    market: Address,
    signer: SigningKey,
}

impl RpcTransactionSubmitter {
    /// Create a submitter invoking `program_id` against `market`.
    #[must_use]
    pub const fn new(rpc: RpcClient, program_id: Address, market: Address, signer: SigningKey) -> Self {
        Self {
            rpc,
            program_id,
            market,
            signer,
        }
    }

    /// Public address of the signing authority.
    #[must_use]
    pub fn authority(&self) -> Address {
        Address::new(self.signer.verifying_key().to_bytes())
    }
}

impl std::fmt::Debug for RpcTransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcTransactionSubmitter")
            .field("rpc", &self.rpc.url())
            .field("program_id", &self.program_id)
            .field("market", &self.market)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TransactionSubmitter for RpcTransactionSubmitter {
    async fn invoke(&self, operation: &str) -> Result<String, SubmitError> {
        let latest = self.rpc.get_latest_blockhash().await?;
        let blockhash: Address = latest
            .blockhash
            .parse()
            .map_err(|e| SubmitError::Build(format!("blockhash: {e}")))?;

        let instruction = Instruction::invoke(self.program_id, operation, self.market, self.authority());
        let signed = sign_transaction(&instruction, &self.signer, &blockhash)
            .map_err(|e| SubmitError::Build(e.to_string()))?;

        tracing::debug!(
            operation,
            signature = %signed.signature,
            last_valid_block_height = latest.last_valid_block_height,
            "Submitting transaction"
        );

        let signature = self.rpc.send_transaction(&signed.wire).await?;
        if signature != signed.signature {
            tracing::warn!(
                expected = %signed.signature,
                returned = %signature,
                "Node returned an unexpected signature"
            );
        }
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn submitter(url: &str) -> RpcTransactionSubmitter {
        RpcTransactionSubmitter::new(
            RpcClient::new(url, Duration::from_millis(500)).unwrap(),
            Address::new([7; 32]),
            Address::new([5; 32]),
            SigningKey::from_bytes(&[9; 32]),
        )
    }

    #[test]
    fn debug_redacts_signer() {
        let debug = format!("{:?}", submitter("http://localhost:8899"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn rejection_keeps_rpc_code() {
        let err: SubmitError = RpcError::Rpc {
            code: -32002,
            message: "Transaction simulation failed".to_string(),
        }
        .into();
        assert!(matches!(err, SubmitError::Rejected { code: -32002, .. }));
    }

    #[tokio::test]
    async fn unreachable_node_is_network_error() {
        let err = submitter("http://127.0.0.1:9").invoke("crank").await.unwrap_err();
        assert!(matches!(err, SubmitError::Network { .. }));
    }
}
