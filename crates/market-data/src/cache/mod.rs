//! In-memory TTL cache.
//!
//! Expiry is checked on read: `get` deletes an entry the moment it finds it
//! stale. Entries that are never read again stay in memory until
//! [`TtlCache::sweep_expired`] runs, which callers may schedule
//! periodically. Both paths are independently testable.

mod policy;

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use serde::Serialize;

use crate::clock;

pub use policy::CacheTtlPolicy;

/// Bookkeeping stored next to a cached value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Provider that produced the value.
    pub provider: String,
    pub stored_at: DateTime<Utc>,
}

/// One cached value. Never mutated after creation.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub expires_at: DateTime<Utc>,
    pub metadata: CacheMetadata,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Keyed TTL cache, one namespace per instance.
pub struct TtlCache<T> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<T>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    /// Fresh value for `key`, deleting it if stale.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        self.get_entry(key, now).map(|entry| entry.value)
    }

    /// Fresh entry for `key`, deleting it if stale.
    pub fn get_entry(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry<T>> {
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value().clone());
            }
        }

        // The read guard must be dropped before removing from the same shard.
        if self.entries.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
            debug!("{} cache: evicted stale entry '{}'", self.name, key);
        }
        None
    }

    pub fn set(
        &self,
        key: impl Into<String>,
        value: T,
        ttl: Duration,
        provider: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            value,
            expires_at: clock::after(now, ttl),
            metadata: CacheMetadata {
                provider: provider.into(),
                stored_at: now,
            },
        };
        self.entries.insert(key.into(), entry);
    }

    pub fn remove(&self, key: &str) -> Option<T> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("{} cache: swept {} expired entries", self.name, removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TtlCache<u32> {
        TtlCache::new("test")
    }

    #[test]
    fn test_fresh_entry_is_returned() {
        let cache = cache();
        let now = Utc::now();
        cache.set("a", 1, Duration::from_secs(10), "FINNHUB", now);

        assert_eq!(cache.get("a", now), Some(1));
        let entry = cache.get_entry("a", clock::after(now, Duration::from_secs(9))).unwrap();
        assert_eq!(entry.metadata.provider, "FINNHUB");
        assert_eq!(entry.metadata.stored_at, now);
    }

    #[test]
    fn test_expired_entry_is_evicted_exactly_once() {
        let cache = cache();
        let now = Utc::now();
        cache.set("a", 1, Duration::from_secs(10), "X", now);
        cache.set("b", 2, Duration::from_secs(60), "X", now);
        assert_eq!(cache.len(), 2);

        let later = clock::after(now, Duration::from_secs(10));
        assert_eq!(cache.get("a", later), None);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.get("a", later), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b", later), Some(2));
    }

    #[test]
    fn test_unread_stale_entries_stay_until_swept() {
        let cache = cache();
        let now = Utc::now();
        cache.set("a", 1, Duration::from_secs(1), "X", now);
        cache.set("b", 2, Duration::from_secs(1), "X", now);
        cache.set("c", 3, Duration::from_secs(100), "X", now);

        let later = clock::after(now, Duration::from_secs(5));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.sweep_expired(later), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep_expired(later), 0);
    }

    #[test]
    fn test_set_replaces_entry() {
        let cache = cache();
        let now = Utc::now();
        cache.set("a", 1, Duration::from_secs(1), "X", now);
        cache.set("a", 2, Duration::from_secs(100), "Y", now);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a", clock::after(now, Duration::from_secs(50))), Some(2));
        assert_eq!(cache.remove("a"), Some(2));
        assert!(cache.is_empty());
    }
}
