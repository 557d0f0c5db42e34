//! Prometheus Metrics Module
//!
//! # Metrics
//!
//! - `market_indexer_sync_cycles_total{outcome}`: completed and failed sync cycles
//! - `market_indexer_observations_stored_total`: rows written to the store
//! - `market_indexer_sync_cycle_seconds`: fetch + store latency per cycle
//! - `market_indexer_invoker_ticks_total{outcome}`: maintenance invocations
//! - `market_indexer_invoker_ticks_skipped_total`: ticks dropped by the overlap guard
//!
//! Recording is a no-op until a recorder is installed, so services and tests
//! can call these functions unconditionally.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the Prometheus recorder and its HTTP listener on `port`.
///
/// Calling it again after a successful install does nothing.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    let _ = INSTALLED.set(());
    tracing::info!(%addr, "Prometheus metrics listener started");
    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "market_indexer_sync_cycles_total",
        "Sync cycles by outcome (ok, error)"
    );
    describe_counter!(
        "market_indexer_observations_stored_total",
        "Observations persisted to the store"
    );
    describe_histogram!(
        "market_indexer_sync_cycle_seconds",
        "Time spent reading the ledger and persisting one cycle"
    );
    describe_counter!(
        "market_indexer_invoker_ticks_total",
        "Maintenance invocations by outcome (ok, error)"
    );
    describe_counter!(
        "market_indexer_invoker_ticks_skipped_total",
        "Invoker ticks skipped because the previous invocation was still running"
    );
}

/// Outcome label for cycle and tick counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Completed successfully.
    Ok,
    /// Failed.
    Error,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Record one sync cycle.
pub fn record_sync_cycle(outcome: Outcome, duration: Duration) {
    counter!(
        "market_indexer_sync_cycles_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("market_indexer_sync_cycle_seconds").record(duration.as_secs_f64());
}

/// Record rows written by a sync cycle.
pub fn record_observations_stored(count: usize) {
    counter!("market_indexer_observations_stored_total").increment(count as u64);
}

/// Record one invoker tick.
pub fn record_invoker_tick(outcome: Outcome) {
    counter!(
        "market_indexer_invoker_ticks_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a tick dropped by the overlap guard.
pub fn record_invoker_tick_skipped() {
    counter!("market_indexer_invoker_ticks_skipped_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(Outcome::Ok.as_str(), "ok");
        assert_eq!(Outcome::Error.as_str(), "error");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_sync_cycle(Outcome::Ok, Duration::from_millis(10));
        record_observations_stored(1);
        record_invoker_tick(Outcome::Error);
        record_invoker_tick_skipped();
    }
}
