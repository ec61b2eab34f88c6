//! Storage configuration types.

use serde::Deserialize;

use super::ServiceRole;

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// One SQLite file per service.
    #[default]
    Sqlite,
    Postgres,
    /// Process-local, lost on exit.
    Memory,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StorageType::Sqlite => "sqlite",
            StorageType::Postgres => "postgres",
            StorageType::Memory => "memory",
        })
    }
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Directory holding `orders.db` and `payments.db`.
    pub dir: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
        }
    }
}

impl SqliteConfig {
    pub fn path_for(&self, role: ServiceRole) -> String {
        std::path::Path::new(&self.dir)
            .join(format!("{}.db", role.name()))
            .to_string_lossy()
            .into_owned()
    }
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// PostgreSQL connection URI. Each service points at its own database.
    pub uri: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/ledgerbridge".to_string(),
            max_connections: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_path_per_role() {
        let config = SqliteConfig {
            dir: "/var/lib/lb".to_string(),
        };
        assert_eq!(config.path_for(ServiceRole::Orders), "/var/lib/lb/orders.db");
        assert_eq!(
            config.path_for(ServiceRole::Payments),
            "/var/lib/lb/payments.db"
        );
    }
}
