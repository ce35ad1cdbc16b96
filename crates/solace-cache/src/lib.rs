//! Redis caching layer for Solace Billing
//!
//! Provides the cross-instance fan-out for committed wallet snapshots (the
//! live balance watch during sessions reads these) and the per-user registry
//! of live session rooms.
//!
//! # Features
//!
//! - Connection pooling via Redis ConnectionManager
//! - Automatic serialization/deserialization using serde_json
//! - TTL support for cache entries
//! - Set operations for the active session registry
//! - Comprehensive error handling with conversion to AppError

pub mod keys;

use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use solace_core::error::AppError;
use solace_core::models::Wallet;
use tracing::{debug, error, warn};

/// Redis cache implementation with connection pooling
///
/// Wraps a Redis ConnectionManager to provide efficient, multiplexed access
/// to Redis. All operations are async and return Results with AppError.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Create a new Redis cache instance
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self { manager })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Convert RedisError to AppError
    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }

    /// Get a value from cache and deserialize it
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();

        let result: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;

        match result {
            Some(json) => {
                let value = serde_json::from_str::<T>(&json).map_err(|e| {
                    error!("Failed to deserialize value for key {}: {}", key, e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                debug!("Cache HIT: {}", key);
                Ok(Some(value))
            }
            None => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    /// Set a value in cache with TTL
    pub async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();

        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for key {}: {}", key, e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;

        let _: () = conn
            .set_ex(key, json, ttl_secs)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(())
    }

    /// Delete a key from cache
    pub async fn delete(&self, key: &str) -> Result<bool, AppError> {
        debug!("DEL {}", key);
        let mut conn = self.manager.clone();

        let deleted: i32 = conn.del(key).await.map_err(Self::map_redis_error)?;

        Ok(deleted > 0)
    }

    /// Check if a key exists in cache
    pub async fn exists(&self, key: &str) -> Result<bool, AppError> {
        debug!("EXISTS {}", key);
        let mut conn = self.manager.clone();

        let exists: bool = conn.exists(key).await.map_err(Self::map_redis_error)?;

        Ok(exists)
    }

    /// Add a member to a set
    pub async fn sadd(&self, key: &str, member: &str) -> Result<bool, AppError> {
        debug!("SADD {} {}", key, member);
        let mut conn = self.manager.clone();

        let added: i32 = conn
            .sadd(key, member)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(added > 0)
    }

    /// Remove a member from a set
    pub async fn srem(&self, key: &str, member: &str) -> Result<bool, AppError> {
        debug!("SREM {} {}", key, member);
        let mut conn = self.manager.clone();

        let removed: i32 = conn
            .srem(key, member)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(removed > 0)
    }

    /// Count set members
    pub async fn scard(&self, key: &str) -> Result<i64, AppError> {
        debug!("SCARD {}", key);
        let mut conn = self.manager.clone();

        let count: i64 = conn.scard(key).await.map_err(Self::map_redis_error)?;

        Ok(count)
    }

    // ==================== Wallet snapshot fan-out ====================

    /// Publish a committed wallet snapshot
    ///
    /// Called after every committed balance mutation so concurrent sessions
    /// (including ones on other instances) observe depletion promptly.
    pub async fn publish_wallet(&self, wallet: &Wallet, ttl_secs: u64) -> Result<(), AppError> {
        self.set(&keys::wallet_key(&wallet.user_id), wallet, ttl_secs)
            .await
    }

    /// Read the latest published wallet snapshot
    pub async fn wallet_snapshot(&self, user_id: &str) -> Result<Option<Wallet>, AppError> {
        self.get(&keys::wallet_key(user_id)).await
    }

    // ==================== Active session registry ====================

    /// Register a live session room for a user
    pub async fn register_session(&self, user_id: &str, room_id: &str) -> Result<(), AppError> {
        let key = keys::active_sessions_key(user_id);
        self.sadd(&key, room_id).await?;
        Ok(())
    }

    /// Remove a live session room for a user
    pub async fn unregister_session(&self, user_id: &str, room_id: &str) -> Result<(), AppError> {
        let key = keys::active_sessions_key(user_id);
        self.srem(&key, room_id).await?;
        Ok(())
    }

    /// Count live sessions for a user
    pub async fn active_session_count(&self, user_id: &str) -> Result<i64, AppError> {
        self.scard(&keys::active_sessions_key(user_id)).await
    }
}
