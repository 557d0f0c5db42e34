//! Application Ports (Driven)
//!
//! Interfaces for the external systems the indexer depends on. The sync
//! and invoker services only see these traits; concrete adapters live in
//! the infrastructure layer.

mod ledger_port;
mod secret_port;
mod store_port;
mod submitter_port;

pub use ledger_port::{LedgerError, LedgerReader};
pub use secret_port::{SecretError, SecretProvider};
pub use store_port::{ObservationStore, StoreError};
pub use submitter_port::{SubmitError, TransactionSubmitter};
