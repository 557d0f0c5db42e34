//! Observation Store Port (Driven Port)
//!
//! Time-series persistence for market observations.

use async_trait::async_trait;

use crate::domain::{Observation, ObservationError, StoredObservation};

/// Observation store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Could not obtain a connection.
    #[error("store connection error: {0}")]
    Connection(String),

    /// A statement failed.
    #[error("store query error: {0}")]
    Query(String),

    /// A row violated a storage-level constraint.
    #[error("store constraint violated: {0}")]
    Constraint(String),

    /// A row could not be converted to or from the domain type.
    #[error("invalid observation: {0}")]
    Observation(#[from] ObservationError),
}

/// Port for persisting observations.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Provision the schema. Safe to call any number of times.
    async fn setup_database(&self) -> Result<(), StoreError>;

    /// Persist a batch atomically, returning the number of rows written.
    ///
    /// Either every observation is stored or none is.
    async fn store_data(&self, observations: Vec<Observation>) -> Result<usize, StoreError>;

    /// Most recent observations for a market, newest first.
    async fn recent(&self, market: &str, limit: u32)
    -> Result<Vec<StoredObservation>, StoreError>;
}
