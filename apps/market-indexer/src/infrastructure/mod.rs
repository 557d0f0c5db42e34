//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Mock ledger and submitter adapters for tests.
pub mod mock;

/// Observation store adapters (TimescaleDB, in-memory).
pub mod persistence;

/// Solana JSON-RPC ledger adapters.
pub mod solana;

/// OpenTelemetry tracing integration.
pub mod telemetry;
