//! Key/value store abstraction and the in-memory implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::{CacheError, CacheResult};

/// Operations the gateway needs from a remote key/value store.
///
/// Implementations must make `incr_ex` atomic per key.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Increment `key`; set its TTL iff this call created it. Returns the new count.
    async fn incr_ex(&self, key: &str, ttl: Duration) -> CacheResult<u64>;

    /// Store `value` under `key` with an optional TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Fetch `key`; `Ok(None)` on miss.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Delete `key`. Returns whether it existed.
    async fn del(&self, key: &str) -> CacheResult<bool>;

    /// Liveness probe.
    async fn ping(&self) -> CacheResult<()>;
}

#[derive(Debug, Clone)]
enum Value {
    Counter(u64),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process store with TTL support.
///
/// Expired entries are dropped lazily on access.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn incr_ex(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        let now = Instant::now();
        // The shard lock held by `entry` makes read-modify-write atomic per key.
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: None,
        });

        if !entry.is_live(now) || matches!(entry.value, Value::Counter(0)) {
            *entry = Entry {
                value: Value::Counter(0),
                expires_at: Some(now + ttl),
            };
        }

        let current = match &entry.value {
            Value::Counter(n) => *n,
            Value::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| CacheError::Overflow(key.to_string()))?,
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| CacheError::Overflow(key.to_string()))?;
        entry.value = Value::Counter(next);
        Ok(next)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let found = self.entries.get(key).map(|e| e.value().clone());
        match found {
            Some(entry) if entry.is_live(now) => Ok(Some(match entry.value {
                Value::Counter(n) => n.to_string().into_bytes(),
                Value::Bytes(bytes) => bytes,
            })),
            Some(_) => {
                self.entries.remove_if(key, |_, e| !e.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, e)| e.is_live(now)))
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
