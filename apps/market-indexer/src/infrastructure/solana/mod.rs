//! Solana Ledger Adapters
//!
//! JSON-RPC implementations of the ledger ports, plus the account and
//! transaction encodings they need.
//!
//! # Components
//!
//! - [`RpcLedgerClient`]: slot and market account reads
//! - [`RpcTransactionSubmitter`]: signed single-instruction transactions
//! - [`KeypairSecret`]: Solana CLI keypair loading
//! - [`MarketLayout`]: market account decoding

mod keypair;
mod layout;
mod rpc;
mod submitter;
mod transaction;

pub use keypair::{KEYPAIR_LEN, KeypairSecret, parse_keypair};
pub use layout::{
    DISCRIMINATOR_LEN, LayoutError, MARKET_ACCOUNT_NAME, MarketLayout, VolumeWidth,
    account_discriminator, instruction_discriminator,
};
pub use rpc::{
    AccountInfo, COMMITMENT, LatestBlockhash, RpcClient, RpcError, RpcLedgerClient, WithContext,
};
pub use submitter::RpcTransactionSubmitter;
pub use transaction::{
    AccountMeta, Instruction, SignedTransaction, TransactionError, compile_message,
    encode_compact_u16, sign_transaction,
};
