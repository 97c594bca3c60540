//! Redis-backed store implementation
//!
//! Uses one cached multiplexed connection for commands and a dedicated
//! connection per subscription. The command connection is opened lazily:
//! an unreachable server surfaces as a `StoreError` on the first command
//! (and on `health_check`) instead of failing construction.

use super::{Fields, Store, Subscription};
use crate::error::{ConfigError, StoreError, StoreResult};

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Default store address
pub const DEFAULT_HOST: &str = "redis:6379";

/// Configuration for the Redis store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// `host:port` or a full `redis://` / `rediss://` URL
    pub host: String,
    /// Password (empty for none)
    pub password: String,
    /// Logical database number
    pub db: i64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            password: String::new(),
            db: 0,
        }
    }
}

impl RedisStoreConfig {
    /// Create config for a host with an optional password
    pub fn new(host: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    /// Build the connection URL
    pub fn url(&self) -> String {
        self.build_url(&self.password)
    }

    /// URL with the password masked, for logs
    pub fn display_url(&self) -> String {
        if self.password.is_empty() {
            self.url()
        } else {
            self.build_url("****")
        }
    }

    fn build_url(&self, password: &str) -> String {
        let host = self.host.trim();
        let (scheme, rest) = match host.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("redis", host),
        };

        // Keep any credentials already present in the address
        if password.is_empty() || rest.contains('@') {
            if host.contains("://") {
                return host.to_string();
            }
            return format!("{}://{}/{}", scheme, rest, self.db);
        }

        let rest = rest.trim_end_matches('/');
        if rest.contains('/') {
            format!("{}://:{}@{}", scheme, password, rest)
        } else {
            format!("{}://:{}@{}/{}", scheme, password, rest, self.db)
        }
    }
}

/// Redis-backed [`Store`]
pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    config: RedisStoreConfig,
}

impl RedisStore {
    /// Create a store handle; does not connect yet
    pub fn new(config: RedisStoreConfig) -> Result<Self, ConfigError> {
        let client =
            Client::open(config.url().as_str()).map_err(|e| ConfigError::InvalidStoreAddress {
                address: config.host.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            config,
        })
    }

    /// Store configuration
    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    /// Get the shared command connection, opening it on first use
    async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                url: self.config.display_url(),
                reason: e.to_string(),
            })?;

        debug!(url = %self.config.display_url(), "Connected to Redis");
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection after a connection-level failure
    ///
    /// Returns whether the error was connection-level.
    async fn reset_on_disconnect(&self, err: &redis::RedisError) -> bool {
        let disconnected = err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_io_error()
            || err.is_timeout();
        if disconnected {
            *self.connection.lock().await = None;
        }
        disconnected
    }

    /// Map a command result, keeping lost connections retryable
    async fn check<T>(
        &self,
        op: &'static str,
        key: &str,
        result: redis::RedisResult<T>,
    ) -> StoreResult<T> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if self.reset_on_disconnect(&err).await {
            Err(StoreError::ConnectionFailed {
                url: self.config.display_url(),
                reason: format!("{} on '{}': {}", op, key, err),
            })
        } else {
            Err(StoreError::op(op, key, err))
        }
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let reply: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;

        match reply {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(other) => Err(StoreError::HealthCheck(format!(
                "unexpected PING reply '{}'",
                other
            ))),
            Err(e) => {
                self.reset_on_disconnect(&e).await;
                Err(StoreError::HealthCheck(format!(
                    "cannot connect to Redis server at {}: {}",
                    self.config.display_url(),
                    e
                )))
            }
        }
    }

    async fn put(&self, key: &str, fields: &Fields) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let result = conn.hset_multiple::<_, _, _, ()>(key, &items).await;
        self.check("HSET", key, result).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let seconds = ttl.as_secs().max(1) as i64;
        let result = conn.expire::<_, ()>(key, seconds).await;
        self.check("EXPIRE", key, result).await
    }

    async fn delete(&self, key: &str, fields: &[&str]) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        if fields.is_empty() {
            let result = conn.del::<_, ()>(key).await;
            return self.check("DEL", key, result).await;
        }

        let result = conn.hdel::<_, _, ()>(key, fields).await;
        self.check("HDEL", key, result).await
    }

    async fn push_tail(&self, list: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let result = conn.rpush::<_, _, ()>(list, value).await;
        self.check("RPUSH", list, result).await
    }

    async fn pop_head(&self, list: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        let result = conn
            .lpop::<_, Option<String>>(list, None::<NonZeroUsize>)
            .await;
        self.check("LPOP", list, result).await
    }

    async fn length(&self, list: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let result = conn.llen::<_, u64>(list).await;
        self.check("LLEN", list, result).await
    }

    async fn get_all(&self, key: &str) -> StoreResult<Option<Fields>> {
        let mut conn = self.conn().await?;
        let result = conn.hgetall::<_, Fields>(key).await;
        let fields = self.check("HGETALL", key, result).await?;

        // Redis answers HGETALL on a missing key with an empty hash
        if fields.is_empty() {
            Ok(None)
        } else {
            Ok(Some(fields))
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        match conn.publish::<_, _, u64>(channel, message).await {
            Ok(receivers) => Ok(receivers),
            Err(e) => {
                self.reset_on_disconnect(&e).await;
                Err(StoreError::PublishFailed {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        let mut pubsub =
            self.client
                .get_async_pubsub()
                .await
                .map_err(|e| StoreError::ConnectionFailed {
                    url: self.config.display_url(),
                    reason: e.to_string(),
                })?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| StoreError::op("SUBSCRIBE", channel, e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let name = channel.to_string();
        let pump = tokio::spawn(async move {
            let messages = pubsub.into_on_message();
            tokio::pin!(messages);
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        if tx.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(channel = %name, error = %e, "Dropping undecodable message"),
                }
            }
        });

        Ok(Subscription::new(channel, rx).with_pump(pump))
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let result = conn.incr::<_, _, i64>(key, 1).await;
        self.check("INCR", key, result).await
    }

    async fn counter(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let result = conn.get::<_, Option<i64>>(key).await;
        Ok(self.check("GET", key, result).await?.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Talking to a live server is left to deployments; these cover
    // address handling only.

    #[test]
    fn test_config_defaults() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.host, "redis:6379");
        assert_eq!(config.url(), "redis://redis:6379/0");
    }

    #[test]
    fn test_url_with_password() {
        let config = RedisStoreConfig::new("cache.local:6380", "s3cret");
        assert_eq!(config.url(), "redis://:s3cret@cache.local:6380/0");
        assert_eq!(config.display_url(), "redis://:****@cache.local:6380/0");
    }

    #[test]
    fn test_full_url_is_kept() {
        let config = RedisStoreConfig::new("rediss://cache.local:6380/2", "");
        assert_eq!(config.url(), "rediss://cache.local:6380/2");

        let config = RedisStoreConfig::new("redis://cache.local:6380/2", "pw");
        assert_eq!(config.url(), "redis://:pw@cache.local:6380/2");
    }

    #[tokio::test]
    async fn test_dropped_connection_is_transient() {
        let store = RedisStore::new(RedisStoreConfig::new("127.0.0.1:1", "")).unwrap();

        let reset = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        let err = store
            .check::<()>("LPOP", "active-queue", Err(reset))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConnectionFailed { .. }));
        assert!(err.is_transient());
        assert!(err.to_string().contains("LPOP on 'active-queue'"));
    }

    #[tokio::test]
    async fn test_command_error_is_permanent() {
        let store = RedisStore::new(RedisStoreConfig::new("127.0.0.1:1", "")).unwrap();

        let wrong_type = redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "WRONGTYPE",
            "Operation against a key holding the wrong kind of value".to_string(),
        ));
        let err = store
            .check::<()>("LPOP", "active-queue", Err(wrong_type))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OperationFailed { op: "LPOP", .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_new_does_not_connect() {
        // Nothing listens on this port; construction must still succeed
        let store = RedisStore::new(RedisStoreConfig::new("127.0.0.1:1", ""));
        assert!(store.is_ok());
    }

    #[test]
    fn test_invalid_address_is_config_error() {
        let result = RedisStore::new(RedisStoreConfig::new("ftp://cache.local", ""));
        assert!(result.is_err());
    }
}
