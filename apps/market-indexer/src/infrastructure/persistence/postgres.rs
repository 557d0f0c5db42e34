//! PostgreSQL / TimescaleDB observation store.
//!
//! Observations land in the `market_data` hypertable, partitioned on `time`
//! and pruned by a 30-day retention policy. Flow volumes are bound as text
//! and cast to `NUMERIC` in SQL, and read back as `NUMERIC::TEXT`, so values
//! beyond the 64-bit range round-trip exactly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::application::ports::{ObservationStore, StoreError};
use crate::domain::{FlowAmount, Observation, StoredObservation};
use crate::infrastructure::config::StoreSettings;

/// Retention horizon for observations.
pub const RETENTION_INTERVAL: &str = "30 days";

const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS timescaledb",
    r"
    CREATE TABLE IF NOT EXISTS market_data (
        time   TIMESTAMPTZ NOT NULL,
        market TEXT        NOT NULL CHECK (market <> ''),
        slot   BIGINT      NOT NULL CHECK (slot > 0),
        flow_a NUMERIC     NOT NULL,
        flow_b NUMERIC     NOT NULL,
        CONSTRAINT positive_flows CHECK (flow_a >= 0 AND flow_b >= 0)
    )
    ",
    "SELECT create_hypertable('market_data', 'time', if_not_exists => TRUE)",
    "CREATE INDEX IF NOT EXISTS idx_market_data_market_time ON market_data (market, time DESC)",
    "CREATE INDEX IF NOT EXISTS idx_market_data_slot ON market_data (slot)",
    "SELECT remove_retention_policy('market_data', if_exists => TRUE)",
    "SELECT add_retention_policy('market_data', INTERVAL '30 days')",
];

/// Observation store backed by a bounded `PostgreSQL` pool.
#[derive(Clone)]
pub struct PostgresObservationStore {
    pool: PgPool,
}

impl PostgresObservationStore {
    /// Build a lazily-connecting pool from settings.
    ///
    /// No connection is attempted until the first query, so an unreachable
    /// server surfaces from `setup_database`.
    #[must_use]
    pub fn connect_lazy(settings: &StoreSettings) -> Self {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.user)
            .password(settings.password());

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .idle_timeout(settings.idle_timeout)
            .acquire_timeout(settings.acquire_timeout)
            .connect_lazy_with(options);

        info!(
            host = %settings.host,
            database = %settings.database,
            max_connections = settings.max_connections,
            "PostgreSQL connection pool initialized"
        );

        Self { pool }
    }

    /// Create a store with an existing pool (for testing).
    #[must_use]
    pub const fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_observation(row: &PgRow) -> Result<StoredObservation, StoreError> {
        let observed_at: DateTime<Utc> = row
            .try_get("time")
            .map_err(|e| StoreError::Query(format!("time: {e}")))?;
        let market: String = row
            .try_get("market")
            .map_err(|e| StoreError::Query(format!("market: {e}")))?;
        let slot: i64 = row
            .try_get("slot")
            .map_err(|e| StoreError::Query(format!("slot: {e}")))?;
        let flow_a: String = row
            .try_get("flow_a")
            .map_err(|e| StoreError::Query(format!("flow_a: {e}")))?;
        let flow_b: String = row
            .try_get("flow_b")
            .map_err(|e| StoreError::Query(format!("flow_b: {e}")))?;

        Ok(StoredObservation {
            observed_at,
            market,
            slot: u64::try_from(slot)
                .map_err(|_| StoreError::Constraint(format!("negative slot {slot}")))?,
            flow_a: flow_a.parse::<FlowAmount>()?,
            flow_b: flow_b.parse::<FlowAmount>()?,
        })
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_check_violation() => {
            StoreError::Constraint(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Connection(err.to_string()),
        _ => StoreError::Query(err.to_string()),
    }
}

#[async_trait]
impl ObservationStore for PostgresObservationStore {
    async fn setup_database(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
        }

        info!(retention = RETENTION_INTERVAL, "Observation store provisioned");
        Ok(())
    }

    async fn store_data(&self, observations: Vec<Observation>) -> Result<usize, StoreError> {
        if observations.is_empty() {
            return Ok(0);
        }

        let slots = observations
            .iter()
            .map(|obs| obs.slot().to_i64())
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for (obs, slot) in observations.iter().zip(slots) {
            sqlx::query(
                r"
                INSERT INTO market_data (time, market, slot, flow_a, flow_b)
                VALUES ($1, $2, $3, $4::TEXT::NUMERIC, $5::TEXT::NUMERIC)
                ",
            )
            .bind(Utc::now())
            .bind(obs.market().as_str())
            .bind(slot)
            .bind(obs.flow_a().to_string())
            .bind(obs.flow_b().to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(count = observations.len(), "Observation batch committed");
        Ok(observations.len())
    }

    async fn recent(
        &self,
        market: &str,
        limit: u32,
    ) -> Result<Vec<StoredObservation>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT time, market, slot, flow_a::TEXT AS flow_a, flow_b::TEXT AS flow_b
            FROM market_data
            WHERE market = $1
            ORDER BY time DESC
            LIMIT $2
            ",
        )
        .bind(market)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(Self::row_to_observation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_create_if_absent() {
        for statement in SCHEMA {
            let upper = statement.to_uppercase();
            assert!(
                upper.contains("IF NOT EXISTS")
                    || upper.contains("IF_NOT_EXISTS")
                    || upper.contains("IF_EXISTS")
                    || upper.contains("ADD_RETENTION_POLICY"),
                "statement is not idempotent: {statement}"
            );
        }
    }

    #[test]
    fn retention_policy_refreshes() {
        let remove = SCHEMA
            .iter()
            .position(|s| s.contains("remove_retention_policy"))
            .unwrap();
        let add = SCHEMA
            .iter()
            .position(|s| s.contains("add_retention_policy"))
            .unwrap();
        assert!(remove < add);
        assert!(SCHEMA[add].contains(RETENTION_INTERVAL));
    }

    #[test]
    fn pool_pressure_maps_to_connection_error() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
    }

    #[tokio::test]
    async fn lazy_pool_does_not_connect() {
        let store = PostgresObservationStore::connect_lazy(&StoreSettings::default());
        assert_eq!(store.pool().size(), 0);
    }

    #[tokio::test]
    async fn empty_batch_never_touches_pool() {
        let mut settings = StoreSettings::default();
        settings.host = "unreachable.invalid".to_string();
        let store = PostgresObservationStore::connect_lazy(&settings);
        assert_eq!(store.store_data(Vec::new()).await.unwrap(), 0);
    }
}
