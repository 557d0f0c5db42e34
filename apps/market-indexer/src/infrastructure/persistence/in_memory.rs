//! In-memory observation store.
//!
//! Enforces the same invariants and all-or-nothing batch semantics as the
//! `PostgreSQL` store, with hooks to inject provisioning and insert failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::application::ports::{ObservationStore, StoreError};
use crate::domain::{Observation, StoredObservation};

/// Observation store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryObservationStore {
    rows: Mutex<Vec<StoredObservation>>,
    setup_calls: AtomicUsize,
    fail_setup: AtomicBool,
    fail_insert_at: Mutex<Option<usize>>,
}

impl InMemoryObservationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `setup_database` fail while `fail` is set.
    pub fn fail_setup(&self, fail: bool) {
        self.fail_setup.store(fail, Ordering::SeqCst);
    }

    /// Fail the insert at position `index` of any batch long enough to reach it.
    pub fn fail_insert_at(&self, index: usize) {
        *self.fail_insert_at.lock() = Some(index);
    }

    /// Stop injecting insert failures.
    pub fn clear_failures(&self) {
        *self.fail_insert_at.lock() = None;
        self.fail_setup.store(false, Ordering::SeqCst);
    }

    /// Number of `setup_database` calls.
    pub fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    /// All committed rows in insertion order.
    pub fn rows(&self) -> Vec<StoredObservation> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl ObservationStore for InMemoryObservationStore {
    async fn setup_database(&self) -> Result<(), StoreError> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("connection refused".to_string()));
        }
        Ok(())
    }

    async fn store_data(&self, observations: Vec<Observation>) -> Result<usize, StoreError> {
        let fail_at = *self.fail_insert_at.lock();
        let mut staged = Vec::with_capacity(observations.len());

        for (index, obs) in observations.into_iter().enumerate() {
            if fail_at == Some(index) {
                return Err(StoreError::Constraint(format!(
                    "injected failure at batch position {index}"
                )));
            }
            obs.slot().to_i64()?;

            staged.push(StoredObservation {
                observed_at: Utc::now(),
                market: obs.market().to_string(),
                slot: obs.slot().get(),
                flow_a: obs.flow_a(),
                flow_b: obs.flow_b(),
            });
        }

        let count = staged.len();
        self.rows.lock().extend(staged);
        Ok(count)
    }

    async fn recent(
        &self,
        market: &str,
        limit: u32,
    ) -> Result<Vec<StoredObservation>, StoreError> {
        let rows = self.rows.lock();
        let mut matching: Vec<StoredObservation> = rows
            .iter()
            .rev()
            .filter(|row| row.market == market)
            .cloned()
            .collect();
        // Stable sort keeps newest-inserted first among equal timestamps
        matching.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FlowAmount, ObservationError};

    fn obs(market: &str, slot: u64) -> Observation {
        Observation::new(market, slot, 1_u64, 2_u64).unwrap()
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let store = InMemoryObservationStore::new();
        assert_eq!(store.store_data(Vec::new()).await.unwrap(), 0);
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn failing_record_rolls_back_batch() {
        let store = InMemoryObservationStore::new();
        store.fail_insert_at(2);

        let batch = vec![obs("m", 1), obs("m", 2), obs("m", 3)];
        let err = store.store_data(batch).await.unwrap_err();

        assert!(matches!(err, StoreError::Constraint(_)));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn unstorable_slot_rolls_back_batch() {
        let store = InMemoryObservationStore::new();
        let batch = vec![obs("m", 1), obs("m", u64::MAX)];

        let err = store.store_data(batch).await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::Observation(ObservationError::SlotOutOfRange(_))
        ));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn addr1_scenario() {
        let store = InMemoryObservationStore::new();
        let batch = vec![Observation::new("Addr1", 12_345, 1000_u64, 2000_u64).unwrap()];

        assert_eq!(store.store_data(batch).await.unwrap(), 1);

        let rows = store.recent("Addr1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].slot, 12_345);
        assert_eq!(rows[0].flow_a, FlowAmount::new(1000));
        assert_eq!(rows[0].flow_b, FlowAmount::new(2000));
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let store = InMemoryObservationStore::new();
        for slot in 1..=5 {
            store.store_data(vec![obs("m", slot)]).await.unwrap();
        }
        store.store_data(vec![obs("other", 9)]).await.unwrap();

        let rows = store.recent("m", 3).await.unwrap();
        let slots: Vec<u64> = rows.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn setup_failure_injection() {
        let store = InMemoryObservationStore::new();
        store.fail_setup(true);
        assert!(store.setup_database().await.is_err());

        store.clear_failures();
        assert!(store.setup_database().await.is_ok());
        assert_eq!(store.setup_calls(), 2);
    }
}
