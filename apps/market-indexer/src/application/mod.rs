//! Application Layer - Services and port definitions.
//!
//! The sync scheduler, recurring invoker and supervisor live here, written
//! against the port traits so they can run over real adapters or mocks.

/// Port interfaces for the ledger, store, submitter and secrets.
pub mod ports;

/// Background services and their lifecycle.
pub mod services;
