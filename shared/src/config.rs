// ============================================================================
// STOCKFLOW - CONFIGURATION MANAGEMENT
// ============================================================================
// Module: shared/src/config.rs
// Description: Environment-based configuration for the service
// ============================================================================

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub cache: CacheConfig,
    pub debug: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64, // seconds
}

/// Kafka consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub max_poll_records: usize,
    pub max_poll_interval_ms: u32,
    pub session_timeout_ms: u32,
    pub heartbeat_interval_ms: u32,
    pub fetch_max_wait_ms: u32,
}

/// Redis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub ttl_seconds: u64,
}

impl CacheConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl AppConfig {
    /// Load configuration from defaults and `STOCKFLOW`-prefixed
    /// environment variables (e.g. `STOCKFLOW_DATABASE__URL`).
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            // Database defaults
            .set_default(
                "database.url",
                "postgresql://postgres:postgres@db:5432/warehouse_db",
            )?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout", 30)?
            // Kafka defaults
            .set_default("kafka.brokers", "kafka:9092")?
            .set_default("kafka.topic", "warehouse_movements")?
            .set_default("kafka.group_id", "warehouse_service_group")?
            .set_default("kafka.max_poll_records", 50)?
            .set_default("kafka.max_poll_interval_ms", 300_000)?
            .set_default("kafka.session_timeout_ms", 30_000)?
            .set_default("kafka.heartbeat_interval_ms", 10_000)?
            .set_default("kafka.fetch_max_wait_ms", 500)?
            // Cache defaults
            .set_default("cache.host", "redis")?
            .set_default("cache.port", 6379)?
            .set_default("cache.db", 0)?
            .set_default("cache.ttl_seconds", 3600)?
            .set_default("debug", false)?
            // Environment overrides
            .add_source(Environment::with_prefix("STOCKFLOW").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.database.max_connections < self.database.min_connections {
            return Err("Max connections must not be below min connections".to_string());
        }

        if self.kafka.brokers.is_empty() {
            return Err("Kafka broker list cannot be empty".to_string());
        }

        if self.kafka.topic.is_empty() || self.kafka.group_id.is_empty() {
            return Err("Kafka topic and group id cannot be empty".to_string());
        }

        if self.kafka.max_poll_records == 0 {
            return Err("Kafka max poll records must be positive".to_string());
        }

        if self.kafka.heartbeat_interval_ms >= self.kafka.session_timeout_ms {
            return Err("Heartbeat interval must be below the session timeout".to_string());
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            database: DatabaseConfig {
                url: "postgresql://postgres:postgres@db:5432/warehouse_db".to_string(),
                max_connections: 20,
                min_connections: 1,
                acquire_timeout: 30,
            },
            kafka: KafkaConfig {
                brokers: "kafka:9092".to_string(),
                topic: "warehouse_movements".to_string(),
                group_id: "warehouse_service_group".to_string(),
                max_poll_records: 50,
                max_poll_interval_ms: 300_000,
                session_timeout_ms: 30_000,
                heartbeat_interval_ms: 10_000,
                fetch_max_wait_ms: 500,
            },
            cache: CacheConfig {
                host: "redis".to_string(),
                port: 6379,
                db: 0,
                ttl_seconds: 3600,
            },
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_topic() {
        let mut config = AppConfig::default();
        config.kafka.topic.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_must_undercut_session_timeout() {
        let mut config = AppConfig::default();
        config.kafka.heartbeat_interval_ms = config.kafka.session_timeout_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_url() {
        let config = AppConfig::default();
        assert_eq!(config.cache.url(), "redis://redis:6379/0");
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
    }
}
