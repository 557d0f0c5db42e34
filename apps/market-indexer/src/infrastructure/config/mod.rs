//! Configuration
//!
//! Environment-driven configuration for the indexer binary.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_EXITS_ADDRESS, DEFAULT_PRICES_ADDRESS, DEFAULT_RPC_URL, IndexerConfig,
    InvokerSettings, KeySource, SolanaSettings, StoreSettings,
};
