//! Indexer Configuration Settings
//!
//! Configuration types for the indexer, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::DEFAULT_OPERATION;
use crate::domain::Address;
use crate::infrastructure::solana::{MarketLayout, VolumeWidth};

/// Public devnet exits account.
pub const DEFAULT_EXITS_ADDRESS: &str = "D467xRNpNHvxbG7nRApDSshnvqVDhL4YjBYqz9TsoKF9";

/// Public devnet prices account.
pub const DEFAULT_PRICES_ADDRESS: &str = "Dpe9rm2NFSTowGbvrwXccbW7FtGfrQCdu6ogugNW6akK";

/// Default ledger RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// PostgreSQL connection and pool settings.
#[derive(Clone)]
pub struct StoreSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Login role.
    pub user: String,
    password: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Idle connections are closed after this long.
    pub idle_timeout: Duration,
    /// Maximum wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl StoreSettings {
    /// Role password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Replace the role password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "mato".to_string(),
            user: "mato".to_string(),
            password: String::new(),
            max_connections: 20,
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(2),
        }
    }
}

impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("idle_timeout", &self.idle_timeout)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Ledger endpoint and program accounts.
#[derive(Debug, Clone)]
pub struct SolanaSettings {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Market program.
    pub program_id: Address,
    /// Exits account, first market seed.
    pub exits: Address,
    /// Prices account, second market seed.
    pub prices: Address,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

/// Where the signing keypair comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Keypair file path.
    Path(PathBuf),
    /// Inline keypair text.
    Inline(String),
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Inline(_) => f.debug_tuple("Inline").field(&"[REDACTED]").finish(),
        }
    }
}

/// Recurring invoker settings. Present only when the invoker is enabled.
#[derive(Debug, Clone)]
pub struct InvokerSettings {
    /// Time between ticks.
    pub interval: Duration,
    /// Program operation invoked on each tick.
    pub operation: String,
    /// Signing keypair source.
    pub key_source: KeySource,
}

/// Complete indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Observation store.
    pub store: StoreSettings,
    /// Ledger endpoint and accounts.
    pub solana: SolanaSettings,
    /// Market account byte layout.
    pub layout: MarketLayout,
    /// Recurring invoker, if enabled.
    pub invoker: Option<InvokerSettings>,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl IndexerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = StoreSettings::default();

        let store = StoreSettings {
            host: env.string_or("PGHOST", &defaults.host),
            port: env.parse_or("PGPORT", defaults.port)?,
            database: env.string_or("PGDATABASE", &defaults.database),
            user: env.string_or("PGUSER", &defaults.user),
            password: env.string_or("PGPASSWORD", ""),
            max_connections: env.parse_or("INDEXER_PG_MAX_CONNECTIONS", defaults.max_connections)?,
            idle_timeout: defaults.idle_timeout,
            acquire_timeout: defaults.acquire_timeout,
        };

        let solana = SolanaSettings {
            rpc_url: env.string_or("SOLANA_RPC_URL", DEFAULT_RPC_URL),
            program_id: env.parse_required("MATO_PROGRAM_ID")?,
            exits: env.parse_or_text("MATO_EXITS_ADDRESS", DEFAULT_EXITS_ADDRESS)?,
            prices: env.parse_or_text("MATO_PRICES_ADDRESS", DEFAULT_PRICES_ADDRESS)?,
            request_timeout: Duration::from_millis(
                env.parse_or("SOLANA_RPC_TIMEOUT_MS", 10_000_u64)?,
            ),
        };

        let layout_defaults = MarketLayout::default();
        let width = match env.non_empty("MARKET_VOLUME_WIDTH") {
            Some(text) => VolumeWidth::from_str_case_insensitive(&text)
                .ok_or_else(|| ConfigError::invalid("MARKET_VOLUME_WIDTH", &text))?,
            None => layout_defaults.width,
        };
        let layout = MarketLayout {
            token_a_offset: env
                .parse_or("MARKET_TOKEN_A_VOLUME_OFFSET", layout_defaults.token_a_offset)?,
            token_b_offset: env
                .parse_or("MARKET_TOKEN_B_VOLUME_OFFSET", layout_defaults.token_b_offset)?,
            width,
        };

        let invoker = match env.non_empty("INVOKER_INTERVAL_MS") {
            None => None,
            Some(text) => {
                let millis: u64 = text
                    .parse()
                    .map_err(|_| ConfigError::invalid("INVOKER_INTERVAL_MS", &text))?;
                if millis == 0 {
                    return Err(ConfigError::invalid("INVOKER_INTERVAL_MS", &text));
                }

                let key_source = if let Some(path) = env.non_empty("SOLANA_KEYPAIR_PATH") {
                    KeySource::Path(PathBuf::from(path))
                } else if let Some(inline) = env.non_empty("SOLANA_KEYPAIR") {
                    KeySource::Inline(inline)
                } else {
                    return Err(ConfigError::MissingEnvVar(
                        "SOLANA_KEYPAIR_PATH or SOLANA_KEYPAIR".to_string(),
                    ));
                };

                Some(InvokerSettings {
                    interval: Duration::from_millis(millis),
                    operation: env.string_or("INVOKER_OPERATION", DEFAULT_OPERATION),
                    key_source,
                })
            }
        };

        Ok(Self {
            store,
            solana,
            layout,
            invoker,
            metrics_port: env.parse_or("INDEXER_METRICS_PORT", 9090_u16)?,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.non_empty(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.non_empty(key).map_or(Ok(default), |text| {
            text.trim()
                .parse()
                .map_err(|_| ConfigError::invalid(key, &text))
        })
    }

    fn parse_or_text<T: std::str::FromStr>(&self, key: &str, default: &str) -> Result<T, ConfigError> {
        let text = self.string_or(key, default);
        text.parse().map_err(|_| ConfigError::invalid(key, &text))
    }

    fn parse_required<T: std::str::FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        let text = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if text.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        text.parse().map_err(|_| ConfigError::invalid(key, &text))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const PROGRAM: &str = "11111111111111111111111111111111";

    fn load(vars: &[(&str, &str)]) -> Result<IndexerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IndexerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_program_id() {
        let config = load(&[("MATO_PROGRAM_ID", PROGRAM)]).unwrap();

        assert_eq!(config.store.host, "localhost");
        assert_eq!(config.store.port, 5432);
        assert_eq!(config.store.max_connections, 20);
        assert_eq!(config.store.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.store.acquire_timeout, Duration::from_secs(2));
        assert_eq!(config.solana.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.solana.exits.to_string(), DEFAULT_EXITS_ADDRESS);
        assert_eq!(config.solana.prices.to_string(), DEFAULT_PRICES_ADDRESS);
        assert_eq!(config.layout, MarketLayout::default());
        assert!(config.invoker.is_none());
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn missing_program_id() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::MissingEnvVar(key)) if key == "MATO_PROGRAM_ID"
        ));
    }

    #[test]
    fn empty_program_id() {
        assert!(matches!(
            load(&[("MATO_PROGRAM_ID", "  ")]),
            Err(ConfigError::EmptyValue(key)) if key == "MATO_PROGRAM_ID"
        ));
    }

    #[test]
    fn unparseable_port_is_rejected() {
        assert!(matches!(
            load(&[("MATO_PROGRAM_ID", PROGRAM), ("PGPORT", "postgres")]),
            Err(ConfigError::Invalid { key, .. }) if key == "PGPORT"
        ));
    }

    #[test]
    fn invoker_requires_key_source() {
        assert!(matches!(
            load(&[("MATO_PROGRAM_ID", PROGRAM), ("INVOKER_INTERVAL_MS", "60000")]),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn invoker_settings() {
        let config = load(&[
            ("MATO_PROGRAM_ID", PROGRAM),
            ("INVOKER_INTERVAL_MS", "60000"),
            ("SOLANA_KEYPAIR_PATH", "/etc/indexer/id.json"),
            ("SOLANA_KEYPAIR", "[1,2,3]"),
        ])
        .unwrap();

        let invoker = config.invoker.unwrap();
        assert_eq!(invoker.interval, Duration::from_secs(60));
        assert_eq!(invoker.operation, DEFAULT_OPERATION);
        assert_eq!(
            invoker.key_source,
            KeySource::Path(PathBuf::from("/etc/indexer/id.json"))
        );
    }

    #[test]
    fn zero_invoker_interval_is_rejected() {
        assert!(matches!(
            load(&[
                ("MATO_PROGRAM_ID", PROGRAM),
                ("INVOKER_INTERVAL_MS", "0"),
                ("SOLANA_KEYPAIR", "[]"),
            ]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn volume_layout_overrides() {
        let config = load(&[
            ("MATO_PROGRAM_ID", PROGRAM),
            ("MARKET_TOKEN_A_VOLUME_OFFSET", "72"),
            ("MARKET_TOKEN_B_VOLUME_OFFSET", "88"),
            ("MARKET_VOLUME_WIDTH", "U128"),
        ])
        .unwrap();

        assert_eq!(config.layout.token_a_offset, 72);
        assert_eq!(config.layout.token_b_offset, 88);
        assert_eq!(config.layout.width, VolumeWidth::U128);
    }

    #[test]
    fn secrets_redacted_debug() {
        let settings = StoreSettings::default().with_password("hunter2");
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));

        let source = KeySource::Inline("[9,9,9]".to_string());
        assert!(!format!("{source:?}").contains("9,9"));
    }
}
