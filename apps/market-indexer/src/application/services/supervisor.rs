//! Process Supervisor
//!
//! Owns the long-running services and decides how the process ends:
//!
//! - shutdown signal: stop everything, let the current sync cycle finish,
//!   exit cleanly
//! - provisioning failure, invoker failure or a panicked task: stop
//!   everything, exit with failure
//!
//! Fatal errors travel back here as task results rather than terminating
//! the process from deep inside a service.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};

use super::recurring_invoker::{InvokerError, RecurringInvoker};
use super::sync_scheduler::{SyncError, SyncScheduler};
use crate::application::ports::{LedgerReader, ObservationStore, TransactionSubmitter};
use crate::domain::Address;

/// Maximum time to wait for the sync loop to wind down after a signal.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How the supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Stopped on request.
    Clean,
    /// Stopped by an unrecoverable error.
    Failure,
}

impl ExitStatus {
    /// Process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Failure => 1,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}

type SyncTask = JoinHandle<Result<(), SyncError>>;
type InvokerTask = JoinHandle<Result<(), InvokerError>>;

/// Runs the sync scheduler and the optional recurring invoker.
pub struct Supervisor<L: ?Sized, S: ?Sized, T: ?Sized> {
    scheduler: Arc<SyncScheduler<L, S>>,
    market: Address,
    invoker: Option<(Arc<RecurringInvoker<T>>, Duration)>,
}

impl<L, S, T> Supervisor<L, S, T>
where
    L: LedgerReader + ?Sized + 'static,
    S: ObservationStore + ?Sized + 'static,
    T: TransactionSubmitter + ?Sized + 'static,
{
    /// Supervise `scheduler` syncing `market`, without an invoker.
    #[must_use]
    pub const fn new(scheduler: Arc<SyncScheduler<L, S>>, market: Address) -> Self {
        Self {
            scheduler,
            market,
            invoker: None,
        }
    }

    /// Also run `invoker` every `interval`.
    #[must_use]
    pub fn with_invoker(mut self, invoker: Arc<RecurringInvoker<T>>, interval: Duration) -> Self {
        self.invoker = Some((invoker, interval));
        self
    }

    /// Like [`run`](Self::run), but on its own task, so a panic inside the
    /// supervisor itself also ends in [`ExitStatus::Failure`].
    pub async fn run_guarded<F>(self, shutdown: F) -> ExitStatus
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::spawn(self.run(shutdown)).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "Supervisor task aborted");
                ExitStatus::Failure
            }
        }
    }

    /// Run until `shutdown` resolves or a service fails.
    pub async fn run<F>(self, shutdown: F) -> ExitStatus
    where
        F: Future<Output = ()>,
    {
        let mut sync_task: SyncTask = tokio::spawn({
            let scheduler = Arc::clone(&self.scheduler);
            let market = self.market;
            async move { scheduler.start(market).await }
        });

        let mut invoker_task: Option<InvokerTask> = self
            .invoker
            .as_ref()
            .map(|(invoker, interval)| invoker.start(*interval));

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping services");
                    self.stop_all();
                    self.drain(sync_task).await;
                    return ExitStatus::Clean;
                }

                joined = &mut sync_task => {
                    self.stop_all();
                    return sync_outcome(joined);
                }

                joined = join_invoker(&mut invoker_task) => {
                    invoker_task = None;
                    match joined {
                        Ok(Ok(())) => {
                            tracing::info!("Recurring invoker disarmed, sync continues");
                        }
                        Ok(Err(e)) => {
                            tracing::error!(error = %e, "Recurring invoker failed");
                            self.stop_all();
                            return ExitStatus::Failure;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Recurring invoker task aborted");
                            self.stop_all();
                            return ExitStatus::Failure;
                        }
                    }
                }
            }
        }
    }

    fn stop_all(&self) {
        self.scheduler.stop();
        if let Some((invoker, _)) = &self.invoker {
            invoker.stop();
        }
    }

    async fn drain(&self, sync_task: SyncTask) {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, sync_task).await {
            Ok(Ok(Ok(()))) => tracing::info!("Sync scheduler drained"),
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Sync scheduler ended with error during shutdown"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Sync scheduler task aborted during shutdown"),
            Err(_) => tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Sync scheduler did not stop in time"
            ),
        }
    }
}

async fn join_invoker(
    task: &mut Option<InvokerTask>,
) -> Result<Result<(), InvokerError>, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn sync_outcome(joined: Result<Result<(), SyncError>, JoinError>) -> ExitStatus {
    match joined {
        Ok(Ok(())) => {
            tracing::info!("Sync scheduler exited");
            ExitStatus::Clean
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Sync scheduler failed");
            ExitStatus::Failure
        }
        Err(e) => {
            tracing::error!(error = %e, "Sync scheduler task aborted");
            ExitStatus::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketAccount;
    use crate::infrastructure::mock::{MockLedger, MockSubmitter};
    use crate::infrastructure::persistence::InMemoryObservationStore;

    type TestSupervisor = Supervisor<MockLedger, InMemoryObservationStore, MockSubmitter>;

    const MARKET: Address = Address::new([3; 32]);

    fn fixtures() -> (
        Arc<MockLedger>,
        Arc<InMemoryObservationStore>,
        Arc<SyncScheduler<MockLedger, InMemoryObservationStore>>,
    ) {
        let ledger = Arc::new(MockLedger::new(
            10,
            MarketAccount {
                token_a_volume: 1,
                token_b_volume: 2,
            },
        ));
        let store = Arc::new(InMemoryObservationStore::new());
        let scheduler = Arc::new(SyncScheduler::new(Arc::clone(&ledger), Arc::clone(&store)));
        (ledger, store, scheduler)
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Clean.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_stops_cleanly() {
        let (_ledger, store, scheduler) = fixtures();
        let supervisor = TestSupervisor::new(Arc::clone(&scheduler), MARKET);

        let status = supervisor
            .run(tokio::time::sleep(Duration::from_millis(12_000)))
            .await;

        assert_eq!(status, ExitStatus::Clean);
        assert!(!scheduler.is_running());
        // cycles at 0, 5s and 10s; the 10s sleep finishes before exit
        assert_eq!(store.rows().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invoker_failure_is_fatal() {
        let (_ledger, _store, scheduler) = fixtures();
        let submitter = Arc::new(MockSubmitter::new());
        submitter.fail_call(0);
        let invoker = Arc::new(RecurringInvoker::new(Arc::clone(&submitter), "crank"));

        let status = TestSupervisor::new(Arc::clone(&scheduler), MARKET)
            .with_invoker(Arc::clone(&invoker), Duration::from_millis(1000))
            .run(std::future::pending())
            .await;

        assert_eq!(status, ExitStatus::Failure);
        assert!(!invoker.is_armed());
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn provisioning_failure_is_fatal() {
        let (_ledger, store, scheduler) = fixtures();
        store.fail_setup(true);

        let status = TestSupervisor::new(scheduler, MARKET)
            .run(std::future::pending())
            .await;

        assert_eq!(status, ExitStatus::Failure);
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_panic_maps_to_failure() {
        let (_ledger, _store, scheduler) = fixtures();

        let status = TestSupervisor::new(Arc::clone(&scheduler), MARKET)
            .run_guarded(async {
                tokio::time::sleep(Duration::from_millis(1000)).await;
                panic!("shutdown handler failed");
            })
            .await;

        assert_eq!(status, ExitStatus::Failure);
        assert_eq!(status.code(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn guarded_run_exits_cleanly_on_signal() {
        let (_ledger, store, scheduler) = fixtures();

        let status = TestSupervisor::new(scheduler, MARKET)
            .run_guarded(tokio::time::sleep(Duration::from_millis(6000)))
            .await;

        assert_eq!(status, ExitStatus::Clean);
        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_invoker_runs_until_signal() {
        let (_ledger, _store, scheduler) = fixtures();
        let submitter = Arc::new(MockSubmitter::new());
        let invoker = Arc::new(RecurringInvoker::new(Arc::clone(&submitter), "crank"));

        let status = TestSupervisor::new(scheduler, MARKET)
            .with_invoker(Arc::clone(&invoker), Duration::from_millis(1000))
            .run(tokio::time::sleep(Duration::from_millis(3500)))
            .await;

        assert_eq!(status, ExitStatus::Clean);
        assert_eq!(submitter.calls(), 3);
        assert!(!invoker.is_armed());
    }
}
