//! In-process response store.
//!
//! Bounded LRU with per-entry deadlines. Expired slots read as absent and are
//! evicted on the next access.

use std::num::NonZeroUsize;
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tracing::warn;

use super::keys::CacheKey;
use super::store::{CacheEntry, CacheStore, StoreError};

struct Slot {
    entry: CacheEntry,
    expires_at: Instant,
}

impl Slot {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        let remaining = self.expires_at.saturating_duration_since(now);
        (!remaining.is_zero()).then_some(remaining)
    }
}

pub struct MemoryStore {
    slots: RwLock<LruCache<CacheKey, Slot>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of slots held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.slots("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self, op: &'static str) -> RwLockWriteGuard<'_, LruCache<CacheKey, Slot>> {
        match self.slots.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    store = "memory",
                    result = "poisoned_recovered",
                    "Recovered from poisoned store lock"
                );
                poisoned.into_inner()
            }
        }
    }

    /// Look up a live slot, evicting it if its deadline has passed.
    fn live<T>(
        &self,
        key: &CacheKey,
        op: &'static str,
        f: impl FnOnce(&Slot, Duration) -> T,
    ) -> Option<T> {
        let now = Instant::now();
        let mut slots = self.slots(op);
        let found = slots
            .get(key)
            .map(|slot| slot.remaining(now).map(|left| f(slot, left)));
        match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                slots.pop(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(self.live(key, "exists", |_, _| ()).is_some())
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.live(key, "get", |slot, _| slot.entry.clone()))
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }

        let slot = Slot {
            entry: entry.clone(),
            expires_at: Instant::now() + ttl,
        };
        self.slots("set").put(key.clone(), slot);
        Ok(())
    }

    async fn ttl_remaining(&self, key: &CacheKey) -> Result<Option<Duration>, StoreError> {
        Ok(self.live(key, "ttl_remaining", |_, left| left))
    }
}
