//! Application Services
//!
//! Long-running services composed from the driven ports:
//!
//! - [`SyncScheduler`]: fixed-cadence ledger-to-store synchronization
//! - [`RecurringInvoker`]: periodic maintenance operation submission
//! - [`Supervisor`]: lifecycle and exit status of the above

mod recurring_invoker;
mod supervisor;
mod sync_scheduler;

pub use recurring_invoker::{DEFAULT_OPERATION, InvokerError, RecurringInvoker};
pub use supervisor::{ExitStatus, SHUTDOWN_TIMEOUT, Supervisor};
pub use sync_scheduler::{
    CycleError, ERROR_BACKOFF, SYNC_PERIOD, SchedulerState, SyncConfig, SyncError, SyncScheduler,
    cadence_sleep,
};
