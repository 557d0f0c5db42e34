//! Market Indexer Binary
//!
//! Starts the sync scheduler and, when configured, the recurring invoker.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-indexer
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MATO_PROGRAM_ID`: Market program address
//!
//! ## Optional
//! - `PGHOST`, `PGPORT`, `PGDATABASE`, `PGUSER`, `PGPASSWORD`: TimescaleDB connection
//!   (default: localhost:5432/mato as mato)
//! - `INDEXER_PG_MAX_CONNECTIONS`: Pool size (default: 20)
//! - `SOLANA_RPC_URL`: JSON-RPC endpoint (default: <https://api.devnet.solana.com>)
//! - `SOLANA_RPC_TIMEOUT_MS`: Per-request timeout (default: 10000)
//! - `MATO_EXITS_ADDRESS`, `MATO_PRICES_ADDRESS`: Market seed accounts (default: devnet)
//! - `MARKET_TOKEN_A_VOLUME_OFFSET`, `MARKET_TOKEN_B_VOLUME_OFFSET`: Volume field offsets
//!   (default: 8, 16)
//! - `MARKET_VOLUME_WIDTH`: "u64" | "u128" (default: u64)
//! - `INVOKER_INTERVAL_MS`: Enables the recurring invoker at this interval
//! - `INVOKER_OPERATION`: Operation to invoke (default: withdraw_swapped_token_a)
//! - `SOLANA_KEYPAIR_PATH` or `SOLANA_KEYPAIR`: Signing keypair, required with the invoker
//! - `INDEXER_METRICS_PORT`: Prometheus metrics port, 0 disables (default: 9090)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`: Span export
//! - `RUST_LOG`: Log level (default: info)

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use market_indexer::application::ports::SecretProvider;
use market_indexer::application::services::{RecurringInvoker, SHUTDOWN_TIMEOUT, Supervisor, SyncScheduler};
use market_indexer::infrastructure::persistence::PostgresObservationStore;
use market_indexer::infrastructure::solana::{
    KeypairSecret, RpcClient, RpcLedgerClient, RpcTransactionSubmitter,
};
use market_indexer::infrastructure::telemetry;
use market_indexer::{IndexerConfig, derive_market_address, init_metrics};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Market Indexer");

    let config = IndexerConfig::from_env()?;
    log_config(&config);

    if config.metrics_port != 0 {
        init_metrics(config.metrics_port).context("failed to start metrics listener")?;
    }

    let market = derive_market_address(
        &config.solana.program_id,
        &config.solana.exits,
        &config.solana.prices,
    )
    .context("failed to derive market address")?;
    tracing::info!(%market, "Market account derived");

    let store = Arc::new(PostgresObservationStore::connect_lazy(&config.store));
    let ledger = Arc::new(RpcLedgerClient::new(
        RpcClient::new(&config.solana.rpc_url, config.solana.request_timeout)?,
        config.layout,
    ));
    let scheduler = Arc::new(SyncScheduler::new(ledger, store));

    let mut supervisor: Supervisor<_, _, RpcTransactionSubmitter> =
        Supervisor::new(scheduler, market);

    if let Some(settings) = &config.invoker {
        let signer = KeypairSecret::new(settings.key_source.clone())
            .signing_key()
            .context("failed to load signing keypair")?;
        let submitter = Arc::new(RpcTransactionSubmitter::new(
            RpcClient::new(&config.solana.rpc_url, config.solana.request_timeout)?,
            config.solana.program_id,
            market,
            signer,
        ));
        tracing::info!(
            authority = %submitter.authority(),
            operation = %settings.operation,
            interval_ms = settings.interval.as_millis(),
            "Recurring invoker enabled"
        );

        let invoker = Arc::new(RecurringInvoker::new(submitter, settings.operation.clone()));
        supervisor = supervisor.with_invoker(invoker, settings.interval);
    } else {
        tracing::info!("Recurring invoker disabled (INVOKER_INTERVAL_MS not set)");
    }

    let status = supervisor.run_guarded(await_shutdown()).await;

    tracing::info!(exit_code = status.code(), "Market Indexer stopped");
    Ok(status.into())
}

fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

fn log_config(config: &IndexerConfig) {
    tracing::info!(
        rpc_url = %config.solana.rpc_url,
        program_id = %config.solana.program_id,
        exits = %config.solana.exits,
        prices = %config.solana.prices,
        pg_host = %config.store.host,
        pg_database = %config.store.database,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(layout = ?config.layout, "Market account layout");
}

fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
