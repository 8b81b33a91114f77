//! Gateway caches
//!
//! Four independent keyed caches: stat results, provider lookups, home creation
//! and personal space creation. Key functions return `None` for lookups that
//! must never be cached, in which case the cache is not consulted at all.

mod cached;
mod keys;

pub use cached::{CachedProvider, CachedRegistry};
pub use keys::{ProviderCache, SpaceCreationCache, StatCache};

use crate::config::{CacheConfig, CacheStore, CachesConfig};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// LRU store whose entries expire after a fixed lifetime
pub struct TtlCache<V> {
    entries: Option<Mutex<LruCache<String, Entry<V>>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache from its configuration; a noop store keeps nothing
    pub fn new(config: &CacheConfig) -> Self {
        let entries = match config.store {
            CacheStore::Noop => None,
            CacheStore::Memory => {
                NonZeroUsize::new(config.capacity).map(|cap| Mutex::new(LruCache::new(cap)))
            }
        };
        Self {
            entries,
            ttl: config.ttl(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Cached value for `key`, if present and not expired
    pub fn pull(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.as_ref()?.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        entries.pop(key);
        None
    }

    pub fn push(&self, key: String, value: V) {
        if let Some(entries) = &self.entries {
            let expires_at = Instant::now() + self.ttl;
            entries.lock().put(key, Entry { value, expires_at });
        }
    }

    pub fn remove(&self, key: &str) {
        if let Some(entries) = &self.entries {
            entries.lock().pop(key);
        }
    }

    /// Drop every entry whose key matches; returns the number removed
    pub fn remove_matching(&self, mut matches: impl FnMut(&str) -> bool) -> usize {
        let Some(entries) = &self.entries else {
            return 0;
        };
        let mut entries = entries.lock();
        let keys: Vec<String> = entries
            .iter()
            .filter(|(key, _)| matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            entries.pop(key);
        }
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map(|e| e.lock().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The caches of one gateway instance
pub struct Caches {
    pub stat: StatCache,
    pub providers: ProviderCache,
    pub create_home: SpaceCreationCache,
    pub create_personal_space: SpaceCreationCache,
}

impl Caches {
    pub fn new(config: &CachesConfig) -> Self {
        Self {
            stat: StatCache::new(&config.stat),
            providers: ProviderCache::new(&config.provider),
            create_home: SpaceCreationCache::new(&config.create_home),
            create_personal_space: SpaceCreationCache::new(&config.create_personal_space),
        }
    }
}
