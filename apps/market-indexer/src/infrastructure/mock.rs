//! Mock ledger and submitter for testing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::application::ports::{LedgerError, LedgerReader, SubmitError, TransactionSubmitter};
use crate::domain::{Address, MarketAccount};

/// Mock ledger serving a fixed slot and market account.
#[derive(Debug)]
pub struct MockLedger {
    slot: AtomicU64,
    account: Mutex<MarketAccount>,
    latency: Duration,
    failing_slot_calls: Mutex<HashSet<usize>>,
    slot_calls: Mutex<Vec<Instant>>,
    call_log: Mutex<Vec<&'static str>>,
}

impl MockLedger {
    /// Create a mock ledger at `slot` holding `account`.
    #[must_use]
    pub fn new(slot: u64, account: MarketAccount) -> Self {
        Self {
            slot: AtomicU64::new(slot),
            account: Mutex::new(account),
            latency: Duration::ZERO,
            failing_slot_calls: Mutex::new(HashSet::new()),
            slot_calls: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Delay every `current_slot` call by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the slot returned from now on.
    pub fn set_slot(&self, slot: u64) {
        self.slot.store(slot, Ordering::SeqCst);
    }

    /// Set the market account returned from now on.
    pub fn set_account(&self, account: MarketAccount) {
        *self.account.lock() = account;
    }

    /// Fail the `current_slot` call with zero-based index `call` with a network error.
    pub fn fail_slot_call(&self, call: usize) {
        self.failing_slot_calls.lock().insert(call);
    }

    /// Times at which `current_slot` was entered.
    #[must_use]
    pub fn slot_call_instants(&self) -> Vec<Instant> {
        self.slot_calls.lock().clone()
    }

    /// Port methods in call order.
    #[must_use]
    pub fn call_log(&self) -> Vec<&'static str> {
        self.call_log.lock().clone()
    }
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn current_slot(&self) -> Result<u64, LedgerError> {
        let call = {
            let mut calls = self.slot_calls.lock();
            calls.push(Instant::now());
            calls.len() - 1
        };
        self.call_log.lock().push("current_slot");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failing_slot_calls.lock().contains(&call) {
            return Err(LedgerError::Network {
                message: format!("connection reset on call {call}"),
            });
        }
        Ok(self.slot.load(Ordering::SeqCst))
    }

    async fn read_market(&self, _address: &Address) -> Result<MarketAccount, LedgerError> {
        self.call_log.lock().push("read_market");
        Ok(*self.account.lock())
    }
}

/// Mock transaction submitter recording every invocation.
#[derive(Debug, Default)]
pub struct MockSubmitter {
    delay: Duration,
    calls: AtomicUsize,
    completed: AtomicUsize,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    failing_calls: Mutex<HashSet<usize>>,
    operations: Mutex<Vec<String>>,
}

impl MockSubmitter {
    /// Create a submitter that succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every invocation for `delay` before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reject the invocation with zero-based index `call`.
    pub fn fail_call(&self, call: usize) {
        self.failing_calls.lock().insert(call);
    }

    /// Invocations started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Invocations finished, successful or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of invocations observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Operation names in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }
}

#[async_trait]
impl TransactionSubmitter for MockSubmitter {
    async fn invoke(&self, operation: &str) -> Result<String, SubmitError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.operations.lock().push(operation.to_string());
        let in_flight = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.failing_calls.lock().contains(&call) {
            return Err(SubmitError::Rejected {
                code: -32002,
                message: format!("simulation failed on call {call}"),
            });
        }
        Ok(format!("mock-signature-{call}"))
    }
}
