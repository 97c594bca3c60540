//! Store abstraction for shared work coordination
//!
//! The store provides the atomic primitives every role builds on: keyed
//! hashes with expiry, a list with atomic pop, an integer counter and
//! ephemeral publish/subscribe. Two backends exist:
//!
//! - [`RedisStore`]: the production backend, shared between processes
//! - [`MemoryStore`]: same semantics inside one process, used by tests and
//!   offline runs
//!
//! Roles never see this trait directly. They receive the narrow handles in
//! [`crate::task`], [`crate::queue`] and [`crate::bus`].

mod memory;
mod redis_store;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

use crate::error::StoreResult;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Flat field map stored under a hash key
pub type Fields = HashMap<String, String>;

/// Operations the coordination protocol consumes from a store
///
/// `pop_head` and `increment` must be atomic across concurrent callers:
/// no two callers may receive the same list entry.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Check that the store is reachable
    async fn health_check(&self) -> StoreResult<()>;

    /// Set fields on a hash
    async fn put(&self, key: &str, fields: &Fields) -> StoreResult<()>;

    /// Expire a key after `ttl`
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    /// Delete fields from a hash, or the whole key when `fields` is empty
    async fn delete(&self, key: &str, fields: &[&str]) -> StoreResult<()>;

    /// Append a value to the tail of a list
    async fn push_tail(&self, list: &str, value: &str) -> StoreResult<()>;

    /// Atomically remove and return the head of a list; `None` when empty
    async fn pop_head(&self, list: &str) -> StoreResult<Option<String>>;

    /// Length of a list (0 when missing)
    async fn length(&self, list: &str) -> StoreResult<u64>;

    /// All fields of a hash; `None` when missing or expired
    async fn get_all(&self, key: &str) -> StoreResult<Option<Fields>>;

    /// Publish a message; returns how many subscribers received it
    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64>;

    /// Subscribe to a channel; the subscription is live when this returns
    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription>;

    /// Atomically increment an integer key, returning the new value
    async fn increment(&self, key: &str) -> StoreResult<i64>;

    /// Current value of an integer key (0 when missing)
    async fn counter(&self, key: &str) -> StoreResult<i64>;
}

/// Live subscription to one channel
///
/// Messages published before the subscription existed are never delivered.
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<String>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(channel: &str, receiver: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            channel: channel.to_string(),
            receiver,
            pump: None,
        }
    }

    /// Attach the background task that feeds this subscription
    pub(crate) fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    /// Wait for the next message; `None` once the subscription is closed
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Take a message if one is already buffered
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    /// Unsubscribe
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.receiver.close();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
