//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod messaging;
mod pipeline;
mod server;
mod storage;

pub use messaging::{KafkaConfig, MessagingConfig, MessagingType};
pub use pipeline::{ConsumerConfig, RelayConfig, TopicsConfig};
pub use server::ServerConfig;
pub use storage::{PostgresConfig, SqliteConfig, StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LEDGERBRIDGE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LEDGERBRIDGE";

/// Legacy: database connection string. Selects PostgreSQL when set.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";
/// Legacy: Kafka bootstrap servers. Selects Kafka when set.
pub const KAFKA_BROKERS_ENV_VAR: &str = "KAFKA_BROKERS";
/// Legacy: HTTP listen port for single-service binaries.
pub const HTTP_PORT_ENV_VAR: &str = "HTTP_PORT";

use serde::Deserialize;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which of the two services a process (or half of the standalone process)
/// is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceRole {
    /// Order ledger, order relay, payment-outcome consumer, push channel.
    Orders,
    /// Funds ledger, payment relay, order-created consumer.
    Payments,
}

impl ServiceRole {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceRole::Orders => "orders",
            ServiceRole::Payments => "payments",
        }
    }
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Ledger storage configuration.
    pub storage: StorageConfig,
    /// Messaging configuration.
    pub messaging: MessagingConfig,
    /// Outbox relay cadence.
    pub relay: RelayConfig,
    /// Inbox consumer settings.
    pub consumer: ConsumerConfig,
    /// Topic names.
    pub topics: TopicsConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy `DATABASE_URL`, `KAFKA_BROKERS` and `HTTP_PORT`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        // Add config file from path argument if provided
        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        // Add config file from CONFIG_ENV_VAR env var if set
        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        // Legacy env vars for backwards compatibility
        if let Ok(url) = std::env::var(DATABASE_URL_ENV_VAR) {
            builder = builder
                .set_override("storage.type", "postgres")?
                .set_override("storage.postgres.uri", url)?;
        }
        if let Ok(brokers) = std::env::var(KAFKA_BROKERS_ENV_VAR) {
            builder = builder
                .set_override("messaging.type", "kafka")?
                .set_override("messaging.kafka.bootstrap_servers", brokers)?;
        }
        if let Ok(port) = std::env::var(HTTP_PORT_ENV_VAR) {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{HTTP_PORT_ENV_VAR}={port}")))?;
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.batch_size == 0 {
            return Err(ConfigError::Invalid("relay.batch_size must be > 0".into()));
        }
        if self.relay.interval_ms == 0 {
            return Err(ConfigError::Invalid("relay.interval_ms must be > 0".into()));
        }
        if self.topics.orders_created == self.topics.payments_processed {
            return Err(ConfigError::Invalid(
                "topics.orders_created and topics.payments_processed must differ".into(),
            ));
        }
        Ok(())
    }

    /// Create config for testing: in-memory storage, channel bus, fast loops.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.storage_type = StorageType::Memory;
        config.relay.interval_ms = 20;
        config.consumer.retry_interval_ms = 20;
        config
    }
}
