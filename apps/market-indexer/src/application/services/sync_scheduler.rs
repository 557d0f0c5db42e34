//! Sync Scheduler Service
//!
//! Fixed-cadence loop that mirrors the market account into the observation
//! store. Each cycle reads the current slot, then the market account, builds
//! one observation and persists it as an atomic batch. The loop then sleeps
//! for whatever is left of the period, so cadence stays fixed regardless of
//! fetch and store latency.
//!
//! Per-cycle failures are logged and followed by a fixed backoff; the loop
//! keeps running. Only a failure to provision the store is fatal.
//!
//! Stopping is cooperative: [`SyncScheduler::stop`] flips the state and the
//! loop observes it at the next iteration boundary, after any in-flight
//! read, write or sleep has completed. Starting again before that point
//! retires the old loop, so only one loop ever keeps cycling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::application::ports::{LedgerError, LedgerReader, ObservationStore, StoreError};
use crate::domain::{Address, ObservationError};
use crate::infrastructure::metrics::{self, Outcome};

/// Target time between cycle starts.
pub const SYNC_PERIOD: Duration = Duration::from_millis(5000);

/// Delay after a failed cycle before the next attempt.
pub const ERROR_BACKOFF: Duration = Duration::from_millis(5000);

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not running. Initial state.
    Stopped = 0,
    /// Cycle loop active.
    Running = 1,
}

impl From<u8> for SchedulerState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Timing configuration for the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Target time between cycle starts.
    pub period: Duration,
    /// Sleep after a failed cycle.
    pub error_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period: SYNC_PERIOD,
            error_backoff: ERROR_BACKOFF,
        }
    }
}

/// A recoverable failure inside one sync cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Ledger read failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Store write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Ledger state did not form a valid observation.
    #[error(transparent)]
    Observation(#[from] ObservationError),
}

/// An unrecoverable scheduler failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Schema provisioning failed before the loop started.
    #[error("observation store provisioning failed: {0}")]
    Provisioning(#[source] StoreError),
}

/// Sleep needed to keep a fixed cadence after a cycle took `elapsed`.
///
/// Never negative: a cycle that overran the period is followed immediately
/// by the next one.
#[must_use]
pub const fn cadence_sleep(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Fixed-cadence ledger-to-store synchronization loop.
pub struct SyncScheduler<L: ?Sized, S: ?Sized> {
    ledger: Arc<L>,
    store: Arc<S>,
    config: SyncConfig,
    state: AtomicU8,
    // Bumped by every start and stop; a loop exits once it no longer matches
    generation: AtomicU64,
}

impl<L, S> SyncScheduler<L, S>
where
    L: LedgerReader + ?Sized,
    S: ObservationStore + ?Sized,
{
    /// Create a stopped scheduler with the default 5 s cadence.
    #[must_use]
    pub fn new(ledger: Arc<L>, store: Arc<S>) -> Self {
        Self::with_config(ledger, store, SyncConfig::default())
    }

    /// Create a stopped scheduler with custom timing.
    #[must_use]
    pub const fn with_config(ledger: Arc<L>, store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            ledger,
            store,
            config,
            state: AtomicU8::new(SchedulerState::Stopped as u8),
            generation: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from(self.state.load(Ordering::SeqCst))
    }

    /// Whether the cycle loop is active.
    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Provision the store and run the cycle loop until stopped.
    ///
    /// Returns immediately with `Ok(())` if the scheduler is already running.
    /// Returns `Ok(())` once a [`stop`](Self::stop) has been observed, and
    /// `Err` only when provisioning fails.
    pub async fn start(&self, target: Address) -> Result<(), SyncError> {
        if self
            .state
            .compare_exchange(
                SchedulerState::Stopped as u8,
                SchedulerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::warn!("Sync scheduler is already running");
            return Ok(());
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Err(e) = self.store.setup_database().await {
            tracing::error!(error = %e, "Fatal error provisioning observation store");
            self.stop();
            return Err(SyncError::Provisioning(e));
        }

        tracing::info!(
            market = %target,
            period_ms = self.config.period.as_millis(),
            "Sync scheduler started"
        );

        while self.is_current(generation) {
            let cycle_start = Instant::now();

            match self.run_cycle(&target).await {
                Ok(record_count) => {
                    let elapsed = cycle_start.elapsed();
                    metrics::record_sync_cycle(Outcome::Ok, elapsed);
                    metrics::record_observations_stored(record_count);
                    tracing::info!(
                        record_count,
                        processing_ms = elapsed.as_millis(),
                        "Indexing cycle completed"
                    );

                    tokio::time::sleep(cadence_sleep(self.config.period, elapsed)).await;
                }
                Err(e) => {
                    metrics::record_sync_cycle(Outcome::Error, cycle_start.elapsed());
                    tracing::error!(
                        error = %e,
                        backoff_ms = self.config.error_backoff.as_millis(),
                        "Error in indexing cycle"
                    );

                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }

        tracing::info!(market = %target, "Sync scheduler stopped");
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Run one read-build-persist cycle against `target`.
    ///
    /// The slot is read before the account, and both before persistence.
    pub async fn run_cycle(&self, target: &Address) -> Result<usize, CycleError> {
        let slot = self.ledger.current_slot().await?;
        let account = self.ledger.read_market(target).await?;
        let observation = account.observe(target, slot)?;

        tracing::debug!(
            slot,
            flow_a = %observation.flow_a(),
            flow_b = %observation.flow_b(),
            "Market observed"
        );

        Ok(self.store.store_data(vec![observation]).await?)
    }

    /// Request the loop to stop at its next iteration boundary.
    ///
    /// Safe to call at any time, including before `start`.
    pub fn stop(&self) {
        let previous = self
            .state
            .swap(SchedulerState::Stopped as u8, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if SchedulerState::from(previous) == SchedulerState::Running {
            tracing::info!("Sync scheduler stopping...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FlowAmount, MarketAccount};
    use crate::infrastructure::mock::MockLedger;
    use crate::infrastructure::persistence::InMemoryObservationStore;
    use proptest::prelude::*;

    const MARKET: Address = Address::new([9; 32]);

    fn scheduler(
        ledger: &Arc<MockLedger>,
        store: &Arc<InMemoryObservationStore>,
    ) -> Arc<SyncScheduler<MockLedger, InMemoryObservationStore>> {
        Arc::new(SyncScheduler::new(Arc::clone(ledger), Arc::clone(store)))
    }

    fn gaps(instants: &[Instant]) -> Vec<Duration> {
        instants.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn cadence_sleep_fills_remaining_period() {
        assert_eq!(
            cadence_sleep(SYNC_PERIOD, Duration::from_millis(1200)),
            Duration::from_millis(3800)
        );
    }

    #[test]
    fn cadence_sleep_is_zero_after_overrun() {
        assert_eq!(cadence_sleep(SYNC_PERIOD, SYNC_PERIOD), Duration::ZERO);
        assert_eq!(
            cadence_sleep(SYNC_PERIOD, Duration::from_millis(9000)),
            Duration::ZERO
        );
    }

    proptest! {
        #[test]
        fn cadence_sleep_never_exceeds_period(elapsed_ms in 0_u64..20_000) {
            let elapsed = Duration::from_millis(elapsed_ms);
            let sleep = cadence_sleep(SYNC_PERIOD, elapsed);
            prop_assert!(sleep <= SYNC_PERIOD);
            if elapsed < SYNC_PERIOD {
                prop_assert_eq!(sleep + elapsed, SYNC_PERIOD);
            } else {
                prop_assert_eq!(sleep, Duration::ZERO);
            }
        }
    }

    #[test]
    fn stop_before_start_is_noop() {
        let ledger = Arc::new(MockLedger::new(1, MarketAccount::default()));
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        scheduler.stop();
        scheduler.stop();

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(store.setup_calls(), 0);
    }

    #[tokio::test]
    async fn run_cycle_stores_exact_observation() {
        let account = MarketAccount {
            token_a_volume: 1000,
            token_b_volume: 2000,
        };
        let ledger = Arc::new(MockLedger::new(12_345, account));
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        let before = chrono::Utc::now();
        let stored = scheduler.run_cycle(&MARKET).await.unwrap();
        let after = chrono::Utc::now();

        assert_eq!(stored, 1);
        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].market, MARKET.to_string());
        assert_eq!(rows[0].slot, 12_345);
        assert_eq!(rows[0].flow_a, FlowAmount::new(1000));
        assert_eq!(rows[0].flow_b, FlowAmount::new(2000));
        assert!(rows[0].observed_at >= before && rows[0].observed_at <= after);
    }

    #[tokio::test]
    async fn run_cycle_reads_slot_before_account() {
        let ledger = Arc::new(MockLedger::new(5, MarketAccount::default()));
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        scheduler.run_cycle(&MARKET).await.unwrap();

        assert_eq!(ledger.call_log(), vec!["current_slot", "read_market"]);
    }

    #[tokio::test]
    async fn run_cycle_propagates_store_failure() {
        let ledger = Arc::new(MockLedger::new(5, MarketAccount::default()));
        let store = Arc::new(InMemoryObservationStore::new());
        store.fail_insert_at(0);
        let scheduler = scheduler(&ledger, &store);

        let err = scheduler.run_cycle(&MARKET).await.unwrap_err();

        assert!(matches!(err, CycleError::Store(_)));
        assert!(store.rows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn short_cycles_keep_fixed_cadence() {
        let ledger = Arc::new(
            MockLedger::new(100, MarketAccount::default())
                .with_latency(Duration::from_millis(1200)),
        );
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        let task = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.start(MARKET).await }
        });
        tokio::time::sleep(Duration::from_millis(16_000)).await;
        scheduler.stop();
        task.await.unwrap().unwrap();

        let starts = ledger.slot_call_instants();
        assert!(starts.len() >= 4);
        assert!(gaps(&starts).iter().all(|gap| *gap == SYNC_PERIOD));
    }

    #[tokio::test(start_paused = true)]
    async fn long_cycles_start_next_immediately() {
        let ledger = Arc::new(
            MockLedger::new(100, MarketAccount::default())
                .with_latency(Duration::from_millis(7000)),
        );
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        let task = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.start(MARKET).await }
        });
        tokio::time::sleep(Duration::from_millis(22_000)).await;
        scheduler.stop();
        task.await.unwrap().unwrap();

        let starts = ledger.slot_call_instants();
        assert!(starts.len() >= 3);
        assert!(
            gaps(&starts)
                .iter()
                .all(|gap| *gap == Duration::from_millis(7000))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ledger_error_backs_off_and_continues() {
        let ledger = Arc::new(MockLedger::new(100, MarketAccount::default()));
        ledger.fail_slot_call(1);
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        let task = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.start(MARKET).await }
        });
        tokio::time::sleep(Duration::from_millis(11_000)).await;

        assert!(scheduler.is_running());
        assert!(!task.is_finished());

        scheduler.stop();
        task.await.unwrap().unwrap();

        let starts = ledger.slot_call_instants();
        // cycle 0 ok, cycle 1 fails, cycle 2 runs after the backoff
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[2] - starts[1], ERROR_BACKOFF);
        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_returns_immediately() {
        let ledger = Arc::new(MockLedger::new(100, MarketAccount::default()));
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        let task = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.start(MARKET).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        scheduler.start(MARKET).await.unwrap();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        scheduler.stop();
        task.await.unwrap().unwrap();

        assert_eq!(store.setup_calls(), 1);
        // one loop: cycles at 0, 5s and 10s
        assert_eq!(ledger.slot_call_instants().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_during_sleep_retires_previous_loop() {
        let ledger = Arc::new(MockLedger::new(100, MarketAccount::default()));
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        let first = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.start(MARKET).await }
        });
        tokio::time::sleep(Duration::from_millis(1000)).await;
        scheduler.stop();
        let second = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.start(MARKET).await }
        });

        tokio::time::sleep(Duration::from_millis(20_500)).await;
        assert!(first.is_finished());
        first.await.unwrap().unwrap();
        assert!(scheduler.is_running());

        scheduler.stop();
        second.await.unwrap().unwrap();

        let starts = ledger.slot_call_instants();
        // old loop at 0; new loop at 1s, 6s, 11s, 16s and 21s
        assert_eq!(starts.len(), 6);
        assert!(gaps(&starts[1..]).iter().all(|gap| *gap == SYNC_PERIOD));
    }

    #[tokio::test]
    async fn provisioning_failure_is_fatal() {
        let ledger = Arc::new(MockLedger::new(100, MarketAccount::default()));
        let store = Arc::new(InMemoryObservationStore::new());
        store.fail_setup(true);
        let scheduler = scheduler(&ledger, &store);

        let result = scheduler.start(MARKET).await;

        assert!(matches!(result, Err(SyncError::Provisioning(_))));
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(ledger.slot_call_instants().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_in_flight_sleep_finish() {
        let ledger = Arc::new(MockLedger::new(100, MarketAccount::default()));
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = scheduler(&ledger, &store);

        let task = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.start(MARKET).await }
        });
        tokio::time::sleep(Duration::from_millis(1000)).await;
        scheduler.stop();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!task.is_finished());

        task.await.unwrap().unwrap();
        assert_eq!(ledger.slot_call_instants().len(), 1);
    }
}
