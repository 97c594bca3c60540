//! In-process store with Redis semantics
//!
//! Every operation takes one lock over the whole keyspace, so pops and
//! increments are atomic across tasks the same way single Redis commands
//! are. Expiry is lazy: an expired key is dropped the next time it is
//! touched. Pub/sub fans out to the subscribers alive at publish time and
//! keeps no backlog.

use super::{Fields, Store, Subscription};
use crate::error::{StoreError, StoreResult};

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug)]
enum Value {
    Hash(Fields),
    List(VecDeque<String>),
    Counter(i64),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Keyspace {
    keys: HashMap<String, Entry>,
    channels: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
}

impl Keyspace {
    /// Look up a key, dropping it first if it has expired
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.keys.get(key).is_some_and(|e| e.is_expired(now)) {
            self.keys.remove(key);
        }
        self.keys.get_mut(key)
    }
}

/// In-memory [`Store`] backend
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Keyspace>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let mut inner = self.inner.lock();
        match inner.channels.get_mut(channel) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn put(&self, key: &str, fields: &Fields) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        match inner.live(key) {
            Some(Entry {
                value: Value::Hash(existing),
                ..
            }) => {
                existing.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            }
            Some(_) => Err(StoreError::op("HSET", key, WRONG_TYPE)),
            None => {
                inner
                    .keys
                    .insert(key.to_string(), Entry::new(Value::Hash(fields.clone())));
                Ok(())
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.live(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str, fields: &[&str]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if fields.is_empty() {
            inner.keys.remove(key);
            return Ok(());
        }

        let now_empty = match inner.live(key) {
            Some(Entry {
                value: Value::Hash(existing),
                ..
            }) => {
                for field in fields {
                    existing.remove(*field);
                }
                existing.is_empty()
            }
            Some(_) => return Err(StoreError::op("HDEL", key, WRONG_TYPE)),
            None => false,
        };

        if now_empty {
            inner.keys.remove(key);
        }
        Ok(())
    }

    async fn push_tail(&self, list: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        match inner.live(list) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => {
                items.push_back(value.to_string());
                Ok(())
            }
            Some(_) => Err(StoreError::op("RPUSH", list, WRONG_TYPE)),
            None => {
                let items = VecDeque::from([value.to_string()]);
                inner
                    .keys
                    .insert(list.to_string(), Entry::new(Value::List(items)));
                Ok(())
            }
        }
    }

    async fn pop_head(&self, list: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock();
        let (head, now_empty) = match inner.live(list) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => {
                let head = items.pop_front();
                (head, items.is_empty())
            }
            Some(_) => return Err(StoreError::op("LPOP", list, WRONG_TYPE)),
            None => return Ok(None),
        };

        // Redis removes a list key once its last element is gone
        if now_empty {
            inner.keys.remove(list);
        }
        Ok(head)
    }

    async fn length(&self, list: &str) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        match inner.live(list) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.len() as u64),
            Some(_) => Err(StoreError::op("LLEN", list, WRONG_TYPE)),
            None => Ok(0),
        }
    }

    async fn get_all(&self, key: &str) -> StoreResult<Option<Fields>> {
        let mut inner = self.inner.lock();
        match inner.live(key) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(Some(fields.clone())),
            Some(_) => Err(StoreError::op("HGETALL", key, WRONG_TYPE)),
            None => Ok(None),
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        let Some(senders) = inner.channels.get_mut(channel) else {
            return Ok(0);
        };

        senders.retain(|tx| tx.send(message.to_string()).is_ok());
        Ok(senders.len() as u64)
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(channel, rx))
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.inner.lock();
        match inner.live(key) {
            Some(Entry {
                value: Value::Counter(n),
                ..
            }) => {
                *n += 1;
                Ok(*n)
            }
            Some(_) => Err(StoreError::op("INCR", key, WRONG_TYPE)),
            None => {
                inner.keys.insert(key.to_string(), Entry::new(Value::Counter(1)));
                Ok(1)
            }
        }
    }

    async fn counter(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.inner.lock();
        match inner.live(key) {
            Some(Entry {
                value: Value::Counter(n),
                ..
            }) => Ok(*n),
            Some(_) => Err(StoreError::op("GET", key, WRONG_TYPE)),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_list_is_fifo() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store.push_tail("q", id).await.unwrap();
        }
        assert_eq!(store.length("q").await.unwrap(), 3);
        assert_eq!(store.pop_head("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop_head("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.pop_head("q").await.unwrap().as_deref(), Some("c"));
        assert_eq!(store.length("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pop_empty_stays_empty() {
        let store = MemoryStore::new();
        store.push_tail("q", "only").await.unwrap();
        store.pop_head("q").await.unwrap();

        for _ in 0..3 {
            assert_eq!(store.pop_head("q").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_hash_round_trip_and_delete() {
        let store = MemoryStore::new();
        store
            .put("command-1", &fields(&[("duration", "42"), ("note", "x")]))
            .await
            .unwrap();

        let got = store.get_all("command-1").await.unwrap().unwrap();
        assert_eq!(got.get("duration").map(String::as_str), Some("42"));

        store.delete("command-1", &["note"]).await.unwrap();
        let got = store.get_all("command-1").await.unwrap().unwrap();
        assert!(!got.contains_key("note"));

        store.delete("command-1", &[]).await.unwrap();
        assert_eq!(store.get_all("command-1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_lazy_and_exact() {
        let store = MemoryStore::new();
        store.put("k", &fields(&[("duration", "1")])).await.unwrap();
        store.expire("k", Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(99)).await;
        assert!(store.get_all("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get_all("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let store = MemoryStore::new();
        store.push_tail("q", "a").await.unwrap();
        assert!(store.get_all("q").await.is_err());
        assert!(store.put("q", &fields(&[("a", "b")])).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_reaches_only_live_subscribers() {
        let store = MemoryStore::new();

        // Nobody listening: message is dropped
        assert_eq!(store.publish("ch", "early").await.unwrap(), 0);

        let mut sub = store.subscribe("ch").await.unwrap();
        assert_eq!(store.publish("ch", "late").await.unwrap(), 1);
        assert_eq!(sub.recv().await.as_deref(), Some("late"));
        assert_eq!(sub.try_recv(), None);

        sub.close();
        assert_eq!(store.publish("ch", "gone").await.unwrap(), 0);
        assert_eq!(store.subscriber_count("ch"), 0);
    }

    #[tokio::test]
    async fn test_counter() {
        let store = MemoryStore::new();
        assert_eq!(store.counter("n").await.unwrap(), 0);
        assert_eq!(store.increment("n").await.unwrap(), 1);
        assert_eq!(store.increment("n").await.unwrap(), 2);
        assert_eq!(store.counter("n").await.unwrap(), 2);

        store.delete("n", &[]).await.unwrap();
        assert_eq!(store.counter("n").await.unwrap(), 0);
    }
}
