//! Redis caching layer for the read path, plus the invalidation hooks the
//! event pipeline calls after each committed transaction.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// Cache key for the stock view of a (warehouse, product) pair.
pub fn stock_key(warehouse_id: &str, product_id: &str) -> String {
    format!("stock:{}:{}", warehouse_id, product_id)
}

/// Cache key for the detail view of a movement.
pub fn movement_key(movement_id: &str) -> String {
    format!("movement:{}", movement_id)
}

/// Manages the Redis connection and the cache operations built on it.
///
/// Values are stored as JSON with ISO-8601 datetimes. Reads and writes are
/// best-effort: a cache failure degrades to a miss (or a skipped write) and a
/// warning, never an error surfaced to the caller.
#[derive(Clone)]
pub struct CacheManager {
    redis: ConnectionManager,
    ttl_seconds: u64,
}

impl CacheManager {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let url = config.url();
        info!(host = %config.host, port = config.port, db = config.db, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())
            .map_err(|e| Error::Configuration(format!("Invalid Redis URL {}: {}", url, e)))?;
        let mut redis = ConnectionManager::new(client).await?;

        redis::cmd("PING").query_async::<_, ()>(&mut redis).await?;
        info!("Successfully connected to Redis");

        Ok(Self {
            redis,
            ttl_seconds: config.ttl_seconds,
        })
    }

    /// Get a value from the cache. Any failure is reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut redis = self.redis.clone();
        match redis.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to decode cached JSON");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read key from Redis");
                None
            }
        }
    }

    /// Store a value in the cache with the configured TTL, best-effort.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize value for cache");
                return;
            }
        };

        let mut redis = self.redis.clone();
        if let Err(e) = redis
            .set_ex::<_, _, ()>(key, raw, self.ttl_seconds)
            .await
        {
            warn!(key = %key, error = %e, "Failed to write key to Redis");
        }
    }

    /// Delete a key from the cache.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        redis.del::<_, ()>(key).await?;
        Ok(())
    }

    /// Invalidate the stock and movement views made stale by a committed
    /// event. The two deletions are independent; failures are downgraded to
    /// warnings because the TTL bounds how long a stale entry can live.
    ///
    /// Callers must only invoke this after the corresponding transaction has
    /// committed, otherwise a concurrent read could repopulate the cache with
    /// the pre-commit value.
    pub async fn invalidate(&self, warehouse_id: &str, product_id: &str, movement_id: &str) {
        for key in [
            stock_key(warehouse_id, product_id),
            movement_key(movement_id),
        ] {
            match self.delete(&key).await {
                Ok(()) => debug!(key = %key, "Cache invalidated"),
                Err(e) => warn!(key = %key, error = %e, "Cache invalidation failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_key_layout() {
        assert_eq!(stock_key("w1", "p1"), "stock:w1:p1");
    }

    #[test]
    fn test_movement_key_layout() {
        assert_eq!(movement_key("m-42"), "movement:m-42");
    }
}
