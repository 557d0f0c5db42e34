//! Observation Store Adapters
//!
//! - [`PostgresObservationStore`]: TimescaleDB hypertable behind a bounded pool
//! - [`InMemoryObservationStore`]: process-local store for tests and dry runs

mod in_memory;
mod postgres;

pub use in_memory::InMemoryObservationStore;
pub use postgres::{PostgresObservationStore, RETENTION_INTERVAL};
