//! Store wrapper that fails selected operations on demand

use super::{Fields, MemoryStore, Store, Subscription};
use crate::error::{StoreError, StoreResult};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// [`MemoryStore`] that returns an error for armed operations
///
/// An operation is armed for every key, or only for one key.
#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    armed: Mutex<HashMap<&'static str, Option<String>>>,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail `op` on every key
    pub(crate) fn fail(&self, op: &'static str) {
        self.armed.lock().insert(op, None);
    }

    /// Fail `op` only on `key`
    pub(crate) fn fail_on(&self, op: &'static str, key: &str) {
        self.armed.lock().insert(op, Some(key.to_string()));
    }

    pub(crate) fn heal(&self, op: &'static str) {
        self.armed.lock().remove(op);
    }

    fn check(&self, op: &'static str, key: &str) -> StoreResult<()> {
        match self.armed.lock().get(op) {
            Some(None) => Err(StoreError::op(op, key, "injected failure")),
            Some(Some(only)) if only == key => Err(StoreError::op(op, key, "injected failure")),
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Store for FaultyStore {
    async fn health_check(&self) -> StoreResult<()> {
        if self.check("health_check", "").is_err() {
            return Err(StoreError::HealthCheck("injected failure".into()));
        }
        self.inner.health_check().await
    }

    async fn put(&self, key: &str, fields: &Fields) -> StoreResult<()> {
        self.check("put", key)?;
        self.inner.put(key, fields).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.check("expire", key)?;
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str, fields: &[&str]) -> StoreResult<()> {
        self.check("delete", key)?;
        self.inner.delete(key, fields).await
    }

    async fn push_tail(&self, list: &str, value: &str) -> StoreResult<()> {
        self.check("push_tail", list)?;
        self.inner.push_tail(list, value).await
    }

    async fn pop_head(&self, list: &str) -> StoreResult<Option<String>> {
        self.check("pop_head", list)?;
        self.inner.pop_head(list).await
    }

    async fn length(&self, list: &str) -> StoreResult<u64> {
        self.check("length", list)?;
        self.inner.length(list).await
    }

    async fn get_all(&self, key: &str) -> StoreResult<Option<Fields>> {
        self.check("get_all", key)?;
        self.inner.get_all(key).await
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64> {
        if self.check("publish", channel).is_err() {
            return Err(StoreError::PublishFailed {
                channel: channel.to_string(),
                reason: "injected failure".into(),
            });
        }
        self.inner.publish(channel, message).await
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        self.check("subscribe", channel)?;
        self.inner.subscribe(channel).await
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        self.check("increment", key)?;
        self.inner.increment(key).await
    }

    async fn counter(&self, key: &str) -> StoreResult<i64> {
        self.check("counter", key)?;
        self.inner.counter(key).await
    }
}
