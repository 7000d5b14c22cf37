//! The [BoundedCache] is a thread-safe map from string keys to shared payloads, bounded by entry count and total cost.
//!
//! Entries live in a [CostBasedLru], so the least recently used entries are the first to go when an insert takes the
//! cache over either limit.  Per-key access counts are kept next to the entries under the same lock: an entry and its
//! statistics are always created, evicted and erased together.
//!
//! Nothing here fails at runtime.  A miss is `None`, an over-full cache evicts, and the only error is asking for a zero
//! limit at construction.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::stats::AccessStats;
use crate::*;

struct Inner<V> {
    entries: CostBasedLru<Arc<str>, V>,
    stats: AccessStats,
}

pub struct BoundedCache<V> {
    config: CacheConfig,
    inner: Mutex<Inner<V>>,
}

/// A cache of decoded images.
pub type ImageCache = BoundedCache<image::DynamicImage>;

/// A cache of encoded image bytes, as fetched.
pub type ImageDataCache = BoundedCache<Vec<u8>>;

impl<V> BoundedCache<V> {
    pub fn new(config: CacheConfig) -> Result<BoundedCache<V>, ConfigError> {
        config.validate()?;
        Ok(BoundedCache::from_valid_config(config))
    }

    pub fn with_limits(
        count_limit: usize,
        total_cost_limit: u64,
    ) -> Result<BoundedCache<V>, ConfigError> {
        BoundedCache::new(CacheConfig {
            count_limit,
            total_cost_limit,
        })
    }

    fn from_valid_config(config: CacheConfig) -> BoundedCache<V> {
        BoundedCache {
            inner: Mutex::new(Inner {
                entries: CostBasedLru::new(config.count_limit, config.total_cost_limit),
                stats: Default::default(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Poisoning is ignored: no method leaves `Inner` half updated across a point that can panic.
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the entry for `key`, then evict least recently used entries until both limits hold.
    ///
    /// Counts as an access.  An entry whose cost alone is above the cost limit is dropped straight away, along with any
    /// older value for the same key.
    pub fn put(&self, key: &str, value: V, cost: u64) {
        self.put_shared(key, Arc::new(value), cost);
    }

    /// Like [BoundedCache::put], for callers that want to keep a handle on the value they hand over.
    pub fn put_shared(&self, key: &str, value: Arc<V>, cost: u64) {
        if key.is_empty() {
            tracing::warn!("Ignoring cache insert with an empty key");
            return;
        }

        let mut guard = self.lock();
        let Inner { entries, stats } = &mut *guard;

        let outcome = entries.insert(Arc::from(key), value, cost);
        let count = stats.record_access(key);
        for e in &outcome.evicted {
            stats.record_eviction(&e.key);
            tracing::debug!(key = %e.key, cost = e.cost, "Evicted cache entry");
        }
        tracing::debug!(
            key = %key,
            cost,
            replaced = outcome.replaced.is_some(),
            access_count = count,
            total_cost = entries.current_cost(),
            "Added cache entry"
        );
    }

    /// Look up `key`, counting a hit and making it the most recently used entry.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut guard = self.lock();
        let Inner { entries, stats } = &mut *guard;

        match entries.get(key) {
            Some(value) => {
                let count = stats.record_hit(key);
                tracing::trace!(key, access_count = count, "Cache hit");
                Some(value)
            }
            None => {
                stats.record_miss();
                tracing::trace!(key, "Cache miss");
                None
            }
        }
    }

    /// Is there a live entry for `key`?  Touches neither recency nor statistics.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Remove the entry for `key` along with its access count.  Removing a missing key does nothing.
    pub fn remove(&self, key: &str) -> Option<Arc<V>> {
        let mut guard = self.lock();
        let removed = guard.entries.remove(key);
        guard.stats.forget(key);
        if removed.is_some() {
            tracing::debug!(key, "Removed cache entry");
        }
        removed
    }

    /// Drop every entry and every access count.  Returns the number of entries and the cost that were released.
    fn flush(&self) -> (usize, u64) {
        let mut guard = self.lock();
        let freed = guard.entries.current_cost();
        let dropped = guard.entries.clear();
        guard.stats.reset();
        (dropped, freed)
    }

    pub fn clear(&self) {
        let (dropped, freed) = self.flush();
        tracing::debug!(entries = dropped, cost = freed, "Cache cleared");
    }

    /// Release everything in response to a host memory warning.  Leaves the cache exactly as [BoundedCache::clear]
    /// would.
    pub fn on_memory_pressure(&self) {
        let (dropped, freed) = self.flush();
        tracing::info!(
            entries = dropped,
            cost = freed,
            "Cache cleared due to memory pressure"
        );
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Summed cost of live entries.
    pub fn total_cost(&self) -> u64 {
        self.lock().entries.current_cost()
    }

    /// Inserts plus hits recorded for `key` since it was last removed, or 0 if it isn't tracked.
    pub fn access_count(&self, key: &str) -> u64 {
        self.lock().stats.count(key)
    }

    /// Every tracked key with its access count, highest first.
    ///
    /// Ties are ordered by when the key was first tracked, oldest first.  Computed fresh on each call.
    pub fn most_accessed(&self) -> Vec<(Arc<str>, u64)> {
        self.lock().stats.most_accessed()
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.lock();
        CacheStats {
            entries: guard.entries.len(),
            total_cost: guard.entries.current_cost(),
            count_limit: guard.entries.max_entries(),
            total_cost_limit: guard.entries.max_cost(),
            hits: guard.stats.hits(),
            misses: guard.stats.misses(),
            evictions: guard.stats.evictions(),
        }
    }
}

impl<V: EstimateCost> BoundedCache<V> {
    /// Insert a value, letting it estimate its own cost.
    pub fn insert(&self, key: &str, value: V) {
        let cost = value.estimate_cost();
        self.put(key, value, cost);
    }
}

impl<V> Default for BoundedCache<V> {
    fn default() -> BoundedCache<V> {
        BoundedCache::from_valid_config(CacheConfig::default())
    }
}

impl<V> std::fmt::Debug for BoundedCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<V: Send + Sync> MemoryPressureListener for BoundedCache<V> {
    fn on_memory_pressure(&self) {
        BoundedCache::on_memory_pressure(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn cache(count_limit: usize, total_cost_limit: u64) -> BoundedCache<String> {
        BoundedCache::with_limits(count_limit, total_cost_limit).expect("Valid limits")
    }

    fn put(cache: &BoundedCache<String>, key: &str, cost: u64) {
        cache.put(key, key.to_uppercase(), cost);
    }

    #[test]
    fn test_round_trip() {
        let cache = cache(10, 1000);
        put(&cache, "a", 1);
        assert_eq!(cache.get("a").as_deref().map(String::as_str), Some("A"));
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_zero_limits_fail_construction() {
        assert!(BoundedCache::<String>::with_limits(0, 10).is_err());
        assert!(BoundedCache::<String>::with_limits(10, 0).is_err());
        assert!(BoundedCache::<String>::new(CacheConfig::default()).is_ok());
    }

    #[test]
    fn test_access_counting() {
        let cache = cache(10, 1000);
        assert_eq!(cache.access_count("k"), 0);

        put(&cache, "k", 1);
        cache.get("k");
        cache.get("k");
        assert_eq!(cache.access_count("k"), 3);

        // Misses on other keys don't count.
        cache.get("nope");
        assert_eq!(cache.access_count("nope"), 0);

        cache.remove("k");
        assert_eq!(cache.access_count("k"), 0);
        assert!(cache.most_accessed().is_empty());
    }

    #[test]
    fn test_overwrite_replaces_cost_and_keeps_counting() {
        let cache = cache(10, 1000);
        put(&cache, "k", 300);
        cache.put("k", "new".to_string(), 100);

        assert_eq!(cache.total_cost(), 100);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.access_count("k"), 2);
        assert_eq!(cache.get("k").as_deref().map(String::as_str), Some("new"));
    }

    #[test]
    fn test_removal_is_idempotent() {
        let cache = cache(10, 1000);
        put(&cache, "a", 10);
        put(&cache, "b", 20);

        assert!(cache.remove("a").is_some());
        let after_once = (cache.len(), cache.total_cost(), cache.most_accessed());
        assert!(cache.remove("a").is_none());
        assert_eq!(
            (cache.len(), cache.total_cost(), cache.most_accessed()),
            after_once
        );
        assert!(cache.remove("never").is_none());
        assert_eq!(cache.total_cost(), 20);
    }

    #[test]
    fn test_clear_resets_fully() {
        let cache = cache(10, 1000);
        for k in ["a", "b", "c"] {
            put(&cache, k, 10);
        }
        cache.clear();

        for k in ["a", "b", "c"] {
            assert!(!cache.contains(k));
            assert_eq!(cache.access_count(k), 0);
        }
        assert_eq!(cache.total_cost(), 0);
        assert!(cache.is_empty());

        // Still usable afterwards.
        put(&cache, "a", 10);
        assert!(cache.contains("a"));
    }

    #[test]
    fn test_eviction_under_cost_pressure() {
        let cache = cache(100, 1000);
        put(&cache, "a", 600);
        put(&cache, "b", 600);

        assert!(cache.total_cost() <= 1000);
        assert!(cache.contains("b"));
        assert!(!cache.contains("a"));
        assert_eq!(cache.access_count("a"), 0);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_count_limit_forces_eviction() {
        let cache = cache(2, 1000);
        put(&cache, "x", 400);
        put(&cache, "y", 400);
        put(&cache, "z", 400);

        assert!(cache.contains("z"));
        assert_eq!(
            ["x", "y"].iter().filter(|k| cache.contains(k)).count(),
            1
        );
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.total_cost(), 800);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = cache(2, 1000);
        put(&cache, "x", 1);
        put(&cache, "y", 1);
        cache.get("x");
        put(&cache, "z", 1);

        assert!(cache.contains("x"));
        assert!(!cache.contains("y"));
    }

    #[test]
    fn test_contains_does_not_touch_statistics() {
        let cache = cache(2, 1000);
        put(&cache, "x", 1);
        put(&cache, "y", 1);
        assert!(cache.contains("x"));
        put(&cache, "z", 1);

        assert!(!cache.contains("x"));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[test]
    fn test_oversized_entry_is_not_kept() {
        let cache = cache(10, 100);
        put(&cache, "small", 40);
        put(&cache, "huge", 101);

        assert!(!cache.contains("huge"));
        assert_eq!(cache.access_count("huge"), 0);
        assert!(cache.contains("small"));
        assert_eq!(cache.total_cost(), 40);
    }

    #[test]
    fn test_cost_limit_of_u64_max() {
        let cache = cache(10, u64::MAX);
        put(&cache, "a", 1);
        put(&cache, "b", u64::MAX);

        assert!(cache.contains("b"));
        assert!(!cache.contains("a"));
        assert_eq!(cache.total_cost(), u64::MAX);
        assert_eq!(cache.most_accessed().len(), 1);

        put(&cache, "c", 3);
        put(&cache, "d", 4);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.total_cost(), 7);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_stats_report_configured_limits() {
        let cache = cache(7, 300);
        put(&cache, "a", 100);
        let stats = cache.stats();
        assert_eq!((stats.count_limit, stats.total_cost_limit), (7, 300));
        assert_eq!((stats.entries, stats.total_cost), (1, 100));
        assert_eq!(
            (stats.count_limit, stats.total_cost_limit),
            (cache.config().count_limit, cache.config().total_cost_limit)
        );
    }

    #[test]
    fn test_empty_key_is_ignored() {
        let cache = cache(10, 100);
        put(&cache, "", 1);
        assert!(cache.is_empty());
        assert!(cache.get("").is_none());
    }

    #[test]
    fn test_memory_pressure_matches_clear() {
        let cleared = cache(10, 1000);
        let pressured = cache(10, 1000);
        for c in [&cleared, &pressured] {
            put(c, "a", 100);
            put(c, "b", 200);
            c.get("a");
            c.get("missing");
        }

        cleared.clear();
        pressured.on_memory_pressure();

        assert_eq!(cleared.stats(), pressured.stats());
        assert_eq!(cleared.most_accessed(), pressured.most_accessed());
        assert!(!pressured.contains("a"));
        assert_eq!(pressured.total_cost(), 0);
    }

    #[test]
    fn test_most_accessed_ordering() {
        let cache = cache(10, 1000);
        put(&cache, "a", 1);
        put(&cache, "b", 1);
        put(&cache, "c", 1);
        for _ in 0..4 {
            cache.get("a");
            cache.get("c");
        }
        cache.get("b");

        let ranked = cache
            .most_accessed()
            .into_iter()
            .map(|(k, n)| (k.to_string(), n))
            .collect::<Vec<_>>();
        assert_eq!(
            ranked,
            vec![
                ("a".to_string(), 5),
                ("c".to_string(), 5),
                ("b".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_values_outlive_eviction_while_referenced() {
        let cache = cache(1, 1000);
        put(&cache, "a", 1);
        let held = cache.get("a").expect("Just inserted");
        put(&cache, "b", 1);

        assert!(!cache.contains("a"));
        assert_eq!(&*held, "A");
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn test_estimated_insert() {
        let cache = BoundedCache::<Vec<u8>>::with_limits(10, 100).unwrap();
        cache.insert("bytes", vec![0; 64]);
        assert_eq!(cache.total_cost(), 64);
        cache.insert("more", vec![0; 64]);
        assert_eq!(cache.total_cost(), 64);
        assert!(cache.contains("more"));
    }

    #[test]
    fn test_concurrent_access_keeps_invariants() {
        let cache = cache(16, 4000);
        std::thread::scope(|s| {
            for t in 0..4 {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..2000u64 {
                        let key = format!("{}", (i * 7 + t) % 40);
                        match i % 5 {
                            0 | 1 => put(cache, &key, (i % 300) + 1),
                            2 | 3 => {
                                cache.get(&key);
                            }
                            _ => {
                                cache.remove(&key);
                            }
                        }
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..50 {
                    cache.on_memory_pressure();
                    std::thread::yield_now();
                }
            });
        });

        let stats = cache.stats();
        assert!(stats.entries <= 16);
        assert!(stats.total_cost <= 4000);
        // Statistics never outlive their entries.
        let guard = cache.lock();
        assert_eq!(guard.stats.tracked(), guard.entries.len());
        for (k, _) in guard.entries.iter() {
            assert!(guard.stats.count(k) >= 1);
        }
    }

    proptest! {
        #[test]
        fn test_capacity_invariant(
            count_limit in 1..10usize,
            total_cost_limit in 1..1000u64,
            ops in prop::collection::vec((0..20u8, 0..1200u64, any::<bool>()), 0..300)
        ) {
            let cache = cache(count_limit, total_cost_limit);
            for (k, cost, is_put) in ops {
                let key = k.to_string();
                if is_put {
                    put(&cache, &key, cost);
                    prop_assert_eq!(cache.contains(&key), cost <= total_cost_limit);
                } else {
                    cache.get(&key);
                }
                prop_assert!(cache.len() <= count_limit);
                prop_assert!(cache.total_cost() <= total_cost_limit);
                prop_assert_eq!(cache.most_accessed().len(), cache.len());
            }
        }
    }
}
