#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Market Indexer - Ledger Market Mirror
//!
//! Mirrors the state of an on-chain market account into a TimescaleDB
//! hypertable on a fixed cadence, and optionally submits a recurring
//! maintenance transaction against the market program.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Pure value types
//!   - `address`: Ledger addresses and program-derived address search
//!   - `market`: Market account volumes
//!   - `observation`: Per-cycle observations and their invariants
//!
//! - **Application**: Services and port definitions
//!   - `ports`: Ledger reader, observation store, transaction submitter, secrets
//!   - `services`: Sync scheduler, recurring invoker, supervisor
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `solana`: JSON-RPC ledger reader and transaction submitter
//!   - `persistence`: TimescaleDB and in-memory observation stores
//!   - `config`: Environment configuration
//!   - `metrics` / `telemetry`: Prometheus and tracing setup
//!
//! # Data Flow
//!
//! ```text
//!                 getSlot, getAccountInfo
//! Solana RPC  <-------------------------  SyncScheduler  --store_data-->  market_data
//!             <-------------------------  RecurringInvoker
//!                 sendTransaction
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Value types with no I/O.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{
    Address, FlowAmount, MarketAccount, Observation, ObservationError, StoredObservation,
    derive_market_address,
};

// Services
pub use application::services::{
    ExitStatus, RecurringInvoker, SchedulerState, Supervisor, SyncConfig, SyncScheduler,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, IndexerConfig};
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
