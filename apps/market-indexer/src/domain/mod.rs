//! Domain Layer - Core indexing types.
//!
//! Pure value types with no I/O: ledger addresses, market account state,
//! and the observations persisted each sync cycle.

/// Ledger addresses and program-derived address search.
pub mod address;

/// On-chain market account state.
pub mod market;

/// Observations and their value objects.
pub mod observation;

pub use address::{Address, AddressError, derive_market_address, find_program_address};
pub use market::MarketAccount;
pub use observation::{
    FlowAmount, MarketId, Observation, ObservationError, Slot, StoredObservation,
};
