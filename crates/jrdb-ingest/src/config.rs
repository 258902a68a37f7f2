//! Configuration management

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/jrdb";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default number of files processed in parallel.
pub const DEFAULT_WORKERS: usize = 4;

/// Default attempts per entity batch before a transient conflict is reported.
pub const DEFAULT_UPSERT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between batch attempts, doubled on each retry.
pub const DEFAULT_UPSERT_RETRY_BACKOFF_MS: u64 = 50;

/// Default rows per upsert statement.
pub const DEFAULT_UPSERT_CHUNK_ROWS: usize = 1_000;

/// Default attempts per file in the orchestrator.
pub const DEFAULT_FILE_MAX_ATTEMPTS: u32 = 2;

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub load: LoadConfig,
    /// Files processed in parallel
    pub workers: usize,
    pub file_max_attempts: u32,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Upsert behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadConfig {
    pub upsert_max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub chunk_rows: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            upsert_max_attempts: DEFAULT_UPSERT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_UPSERT_RETRY_BACKOFF_MS,
            chunk_rows: DEFAULT_UPSERT_CHUNK_ROWS,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl IngestConfig {
    /// Load configuration from environment and defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = IngestConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "JRDB_DB_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "JRDB_DB_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "JRDB_DB_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "JRDB_DB_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            load: LoadConfig {
                upsert_max_attempts: env_or(
                    "JRDB_UPSERT_MAX_ATTEMPTS",
                    DEFAULT_UPSERT_MAX_ATTEMPTS,
                ),
                retry_backoff_ms: env_or(
                    "JRDB_UPSERT_RETRY_BACKOFF_MS",
                    DEFAULT_UPSERT_RETRY_BACKOFF_MS,
                ),
                chunk_rows: env_or("JRDB_UPSERT_CHUNK_ROWS", DEFAULT_UPSERT_CHUNK_ROWS),
            },
            workers: env_or("JRDB_WORKERS", DEFAULT_WORKERS),
            file_max_attempts: env_or("JRDB_FILE_MAX_ATTEMPTS", DEFAULT_FILE_MAX_ATTEMPTS),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(IngestError::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(IngestError::Config(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.workers == 0 {
            return Err(IngestError::Config("workers must be greater than 0".to_string()));
        }

        if self.load.upsert_max_attempts == 0 || self.file_max_attempts == 0 {
            return Err(IngestError::Config(
                "retry attempts must be at least 1".to_string(),
            ));
        }

        if self.load.chunk_rows == 0 {
            return Err(IngestError::Config(
                "upsert chunk size must be greater than 0".to_string(),
            ));
        }

        // Each worker holds a connection for its whole file
        if self.workers > self.database.max_connections as usize {
            tracing::warn!(
                workers = self.workers,
                max_connections = self.database.max_connections,
                "More workers than pool connections, some workers will wait"
            );
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            load: LoadConfig::default(),
            workers: DEFAULT_WORKERS,
            file_max_attempts: DEFAULT_FILE_MAX_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.load.upsert_max_attempts, 3);
        assert_eq!(config.file_max_attempts, 2);
    }

    #[test]
    fn test_min_above_max_connections_is_rejected() {
        let mut config = IngestConfig::default();
        config.database.min_connections = 20;
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let mut config = IngestConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let mut config = IngestConfig::default();
        config.load.upsert_max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("JRDB_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or("JRDB_TEST_ENV_OR", 7_u32), 7);
        std::env::set_var("JRDB_TEST_ENV_OR", "12");
        assert_eq!(env_or("JRDB_TEST_ENV_OR", 7_u32), 12);
        std::env::remove_var("JRDB_TEST_ENV_OR");
    }
}
