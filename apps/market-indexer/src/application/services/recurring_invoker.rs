//! Recurring Invoker Service
//!
//! Periodically invokes one named maintenance operation of the market
//! program through a [`TransactionSubmitter`].
//!
//! The timer fires every `interval`, with the first tick one interval after
//! arming. Each tick runs in its own task so a slow submission never delays
//! the timer. At most one submission is in flight: a tick that fires while
//! the previous one is still running is skipped.
//!
//! A failed submission disarms the invoker and surfaces as the `Err` of the
//! timer task, which the supervisor treats as fatal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SubmitError, TransactionSubmitter};
use crate::infrastructure::metrics::{self, Outcome};

/// Operation invoked when none is configured.
pub const DEFAULT_OPERATION: &str = "withdraw_swapped_token_a";

/// Invoker failure. Always fatal to the process.
#[derive(Debug, Error)]
pub enum InvokerError {
    /// A tick's submission failed.
    #[error("invocation of {operation} failed: {source}")]
    TickFailed {
        /// Operation that was invoked.
        operation: String,
        /// Submission error.
        #[source]
        source: SubmitError,
    },

    /// A tick's task panicked.
    #[error("invocation task panicked: {0}")]
    Panicked(String),
}

/// Fixed-interval invoker of a single program operation.
pub struct RecurringInvoker<T: ?Sized> {
    submitter: Arc<T>,
    operation: String,
    timer: Mutex<Option<CancellationToken>>,
    in_flight: Arc<AtomicBool>,
}

impl<T> RecurringInvoker<T>
where
    T: TransactionSubmitter + ?Sized + 'static,
{
    /// Create a disarmed invoker for `operation`.
    pub fn new(submitter: Arc<T>, operation: impl Into<String>) -> Self {
        Self {
            submitter,
            operation: operation.into(),
            timer: Mutex::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Operation invoked on every tick.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Whether the timer is currently armed.
    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Arm the timer, firing every `interval` until stopped or a tick fails.
    ///
    /// If already armed, logs a warning and returns a handle that completes
    /// immediately with `Ok(())`; the existing timer is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn start(&self, interval: Duration) -> JoinHandle<Result<(), InvokerError>> {
        let token = {
            let mut timer = self.timer.lock();
            if timer.as_ref().is_some_and(|token| !token.is_cancelled()) {
                tracing::warn!(operation = %self.operation, "Recurring invoker is already armed");
                return tokio::spawn(async { Ok(()) });
            }
            let token = CancellationToken::new();
            *timer = Some(token.clone());
            token
        };

        tracing::info!(
            operation = %self.operation,
            interval_ms = interval.as_millis(),
            "Recurring invoker armed"
        );

        tokio::spawn(run_timer(
            Arc::clone(&self.submitter),
            self.operation.clone(),
            interval,
            token,
            Arc::clone(&self.in_flight),
        ))
    }

    /// Disarm the timer. An in-flight submission is allowed to finish.
    ///
    /// Safe to call at any time.
    pub fn stop(&self) {
        if let Some(token) = self.timer.lock().take() {
            if !token.is_cancelled() {
                tracing::info!(operation = %self.operation, "Recurring invoker stopping...");
            }
            token.cancel();
        }
    }
}

async fn run_timer<T>(
    submitter: Arc<T>,
    operation: String,
    interval: Duration,
    token: CancellationToken,
    in_flight: Arc<AtomicBool>,
) -> Result<(), InvokerError>
where
    T: TransactionSubmitter + ?Sized + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks: JoinSet<Result<(), InvokerError>> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => {
                // Let any in-flight submission run to completion
                ticks.detach_all();
                tracing::info!(operation = %operation, "Recurring invoker disarmed");
                return Ok(());
            }

            Some(joined) = ticks.join_next() => {
                let result = joined.unwrap_or_else(|e| Err(InvokerError::Panicked(e.to_string())));
                if let Err(e) = result {
                    token.cancel();
                    tracing::error!(error = %e, "Fatal error in recurring invoker");
                    return Err(e);
                }
            }

            _ = ticker.tick() => {
                if in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    metrics::record_invoker_tick_skipped();
                    tracing::debug!(operation = %operation, "Previous invocation still running, skipping tick");
                    continue;
                }

                ticks.spawn(invoke_once(
                    Arc::clone(&submitter),
                    operation.clone(),
                    Arc::clone(&in_flight),
                ));
            }
        }
    }
}

async fn invoke_once<T>(
    submitter: Arc<T>,
    operation: String,
    in_flight: Arc<AtomicBool>,
) -> Result<(), InvokerError>
where
    T: TransactionSubmitter + ?Sized,
{
    let result = submitter.invoke(&operation).await;
    in_flight.store(false, Ordering::Release);

    match result {
        Ok(signature) => {
            metrics::record_invoker_tick(Outcome::Ok);
            tracing::info!(operation = %operation, %signature, "Maintenance invocation submitted");
            Ok(())
        }
        Err(source) => {
            metrics::record_invoker_tick(Outcome::Error);
            Err(InvokerError::TickFailed { operation, source })
        }
    }
}
