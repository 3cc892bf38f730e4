//! Expiring in-memory stores for segments and full routes.
//!
//! Expiry is lazy: lookups check the entry age against the TTL and expired
//! entries stay in place until [`ExpiringCache::evict_expired`] or an
//! overwrite removes them. Each store is also capacity-bounded (LRU) so a
//! long-lived tracker cannot grow it without limit.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracker_shared::RouteResult;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
}

pub struct ExpiringCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Raw lookup, expired or not. Does not touch LRU order.
    pub fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.lock().peek(key).cloned()
    }

    /// Lookup that only returns entries younger than the TTL. Only a hit
    /// counts as a use.
    pub fn get_valid(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let valid = entries
            .peek(key)
            .is_some_and(|entry| self.is_valid_at(entry, now));
        if !valid {
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: String, value: V) {
        self.entries.lock().put(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
    }

    pub fn is_valid(&self, entry: &CacheEntry<V>) -> bool {
        self.is_valid_at(entry, Instant::now())
    }

    pub fn is_valid_at(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) < self.ttl
    }

    /// Removes every entry that fails the validity check, returning how many went.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !self.is_valid_at(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_valid(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| self.is_valid_at(entry, now))
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionCounts {
    pub segments: usize,
    pub routes: usize,
}

/// The segment store (`from -> to`) and the full-route store (whole sequence).
pub struct RouteCaches {
    pub segments: ExpiringCache<Arc<RouteResult>>,
    pub routes: ExpiringCache<Arc<RouteResult>>,
}

impl RouteCaches {
    pub fn new(segment_capacity: NonZeroUsize, route_capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            segments: ExpiringCache::new(segment_capacity, ttl),
            routes: ExpiringCache::new(route_capacity, ttl),
        }
    }

    pub fn evict_expired(&self) -> EvictionCounts {
        EvictionCounts {
            segments: self.segments.evict_expired(),
            routes: self.routes.evict_expired(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(24 * 60 * 60);

    fn cache(capacity: usize) -> ExpiringCache<u32> {
        ExpiringCache::new(NonZeroUsize::new(capacity).unwrap(), TTL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let cache = cache(4);
        cache.set("a".to_string(), 1);
        let entry = cache.get("a").unwrap();
        let written = entry.created_at;

        assert!(cache.is_valid_at(&entry, written + TTL - Duration::from_millis(1)));
        assert!(!cache.is_valid_at(&entry, written + TTL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_inert_but_present() {
        let cache = cache(4);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get_valid("a"), Some(1));

        tokio::time::advance(TTL).await;

        assert_eq!(cache.get_valid("a"), None);
        assert!(cache.get("a").is_some());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.count_valid(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_timestamp() {
        let cache = cache(4);
        cache.set("a".to_string(), 1);
        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        cache.set("a".to_string(), 2);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(cache.get_valid("a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired_keeps_fresh_entries() {
        let cache = cache(8);
        cache.set("old-1".to_string(), 1);
        cache.set("old-2".to_string(), 2);
        tokio::time::advance(TTL).await;
        cache.set("fresh".to_string(), 3);

        assert_eq!(cache.evict_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_valid("fresh"), Some(3));
        assert_eq!(cache.evict_expired(), 0);
    }

    #[test]
    fn test_capacity_bound_drops_least_recent() {
        let cache = cache(2);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        assert_eq!(cache.get_valid("a"), Some(1));
        cache.set("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lookup_does_not_keep_entry_alive() {
        let cache = cache(2);
        cache.set("stale".to_string(), 1);
        tokio::time::advance(TTL).await;
        cache.set("fresh".to_string(), 2);

        assert_eq!(cache.get_valid("stale"), None);
        assert!(cache.get("stale").is_some());
        cache.set("newer".to_string(), 3);

        assert!(cache.get("stale").is_none());
        assert_eq!(cache.get_valid("fresh"), Some(2));
        assert_eq!(cache.get_valid("newer"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_caches_evict_independently() {
        let caches = RouteCaches::new(
            NonZeroUsize::new(4).unwrap(),
            NonZeroUsize::new(4).unwrap(),
            TTL,
        );
        let route = Arc::new(RouteResult {
            distance: 1.0,
            duration: 1.0,
            geometry: Default::default(),
        });
        caches.segments.set("s".to_string(), Arc::clone(&route));
        tokio::time::advance(TTL).await;
        caches.routes.set("r".to_string(), route);

        let counts = caches.evict_expired();
        assert_eq!(counts, EvictionCounts { segments: 1, routes: 0 });
        assert_eq!(caches.routes.len(), 1);
    }
}
