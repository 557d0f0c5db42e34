//! Solana JSON-RPC client and ledger reader.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use super::layout::MarketLayout;
use crate::application::ports::{LedgerError, LedgerReader};
use crate::domain::{Address, MarketAccount};

/// Commitment level used for every read and simulation.
pub const COMMITMENT: &str = "confirmed";

/// JSON-RPC transport error.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Request could not be sent or the response not read.
    #[error("rpc transport error: {0}")]
    Network(String),

    /// Node answered with an error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("unexpected rpc response: {0}")]
    Decode(String),
}

impl From<RpcError> for LedgerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Network(message) => Self::Network { message },
            RpcError::Rpc { code, message } => Self::Rpc { code, message },
            RpcError::Decode(message) => Self::Decode { message },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Result wrapped with the slot it was read at.
#[derive(Debug, Deserialize)]
pub struct WithContext<T> {
    /// Payload.
    pub value: T,
}

/// Account as returned by `getAccountInfo` with base64 encoding.
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    /// `[data, encoding]` pair.
    pub data: (String, String),
    /// Owning program.
    pub owner: String,
    /// Balance in lamports.
    pub lamports: u64,
}

/// `getLatestBlockhash` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBlockhash {
    /// Base-58 blockhash.
    pub blockhash: String,
    /// Last block height at which the hash is accepted.
    pub last_valid_block_height: u64,
}

/// Minimal JSON-RPC 2.0 client for a Solana node.
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` with positional `params`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RpcError::Network(e.to_string()))?;

        if !status.is_success() && text.is_empty() {
            return Err(RpcError::Network(format!("HTTP {status}")));
        }

        tracing::trace!(method, id, "RPC response received");
        parse_response(&text)
    }

    /// Current slot at `confirmed` commitment.
    pub async fn get_slot(&self) -> Result<u64, RpcError> {
        self.call("getSlot", json!([{ "commitment": COMMITMENT }]))
            .await
    }

    /// Account data, or `None` if the account does not exist.
    pub async fn get_account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, RpcError> {
        let info: WithContext<Option<AccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), { "encoding": "base64", "commitment": COMMITMENT }]),
            )
            .await?;

        info.value
            .map(|account| {
                BASE64
                    .decode(account.data.0)
                    .map_err(|e| RpcError::Decode(format!("account data: {e}")))
            })
            .transpose()
    }

    /// Most recent blockhash at `confirmed` commitment.
    pub async fn get_latest_blockhash(&self) -> Result<LatestBlockhash, RpcError> {
        let response: WithContext<LatestBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": COMMITMENT }]))
            .await?;
        Ok(response.value)
    }

    /// Submit a signed, serialized transaction. Returns its signature.
    pub async fn send_transaction(&self, wire: &[u8]) -> Result<String, RpcError> {
        self.call(
            "sendTransaction",
            json!([
                BASE64.encode(wire),
                { "encoding": "base64", "preflightCommitment": COMMITMENT }
            ]),
        )
        .await
    }
}

fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, RpcError> {
    let response: RpcResponse<T> =
        serde_json::from_str(text).map_err(|e| RpcError::Decode(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(RpcError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    response
        .result
        .ok_or_else(|| RpcError::Decode("response has neither result nor error".to_string()))
}

/// Ledger reader over JSON-RPC.
#[derive(Debug)]
pub struct RpcLedgerClient {
    rpc: RpcClient,
    layout: MarketLayout,
}

impl RpcLedgerClient {
    /// Create a reader decoding market accounts with `layout`.
    #[must_use]
    pub const fn new(rpc: RpcClient, layout: MarketLayout) -> Self {
        Self { rpc, layout }
    }
}

#[async_trait]
impl LedgerReader for RpcLedgerClient {
    async fn current_slot(&self) -> Result<u64, LedgerError> {
        Ok(self.rpc.get_slot().await?)
    }

    async fn read_market(&self, address: &Address) -> Result<MarketAccount, LedgerError> {
        let data = self
            .rpc
            .get_account_data(address)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound {
                address: address.to_string(),
            })?;

        self.layout.decode(&data).map_err(|e| LedgerError::Decode {
            message: e.to_string(),
        })
    }
}
