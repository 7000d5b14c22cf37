//! Access statistics kept alongside the entries of a [BoundedCache](crate::BoundedCache).
//!
//! Every successful insert and every lookup hit counts as an access to a key.  A key's record lives exactly as long as
//! the cache entry it describes: removal, eviction, and flushing all erase it, so a key that was dropped and one that
//! was never inserted look the same.
use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;

#[derive(Debug, Clone, Copy)]
struct AccessRecord {
    count: u64,
    /// When this key was first tracked, used to break ties between equal counts.
    sequence: u64,
}

#[derive(Debug, Default)]
pub(crate) struct AccessStats {
    records: HashMap<Arc<str>, AccessRecord, RandomState>,
    next_sequence: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl AccessStats {
    /// Count an access to `key`, returning the new count.
    pub(crate) fn record_access(&mut self, key: &str) -> u64 {
        if let Some(r) = self.records.get_mut(key) {
            r.count += 1;
            return r.count;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records
            .insert(Arc::from(key), AccessRecord { count: 1, sequence });
        1
    }

    /// Count a lookup hit, returning the new count for the key.
    pub(crate) fn record_hit(&mut self, key: &str) -> u64 {
        self.hits += 1;
        self.record_access(key)
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_eviction(&mut self, key: &str) {
        self.evictions += 1;
        self.forget(key);
    }

    pub(crate) fn forget(&mut self, key: &str) {
        self.records.remove(key);
    }

    /// Erase every per-key record.  Lifetime counters are kept.
    pub(crate) fn reset(&mut self) {
        self.records.clear();
    }

    pub(crate) fn count(&self, key: &str) -> u64 {
        self.records.get(key).map_or(0, |r| r.count)
    }

    pub(crate) fn tracked(&self) -> usize {
        self.records.len()
    }

    /// All tracked keys, highest count first.  Equal counts keep the order in which the keys were first tracked.
    pub(crate) fn most_accessed(&self) -> Vec<(Arc<str>, u64)> {
        let mut ranked = self
            .records
            .iter()
            .map(|(k, r)| (k, *r))
            .collect::<Vec<_>>();
        ranked.sort_unstable_by(|(_, a), (_, b)| {
            b.count.cmp(&a.count).then(a.sequence.cmp(&b.sequence))
        });
        ranked
            .into_iter()
            .map(|(k, r)| (k.clone(), r.count))
            .collect()
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits
    }

    pub(crate) fn misses(&self) -> u64 {
        self.misses
    }

    pub(crate) fn evictions(&self) -> u64 {
        self.evictions
    }
}

/// A point-in-time view of a cache's usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of live entries.
    pub entries: usize,
    /// Summed cost of live entries.
    pub total_cost: u64,
    pub count_limit: usize,
    pub total_cost_limit: u64,
    /// Lookups that found an entry, over the cache's lifetime.
    pub hits: u64,
    /// Lookups that found nothing, over the cache's lifetime.
    pub misses: u64,
    /// Entries dropped to satisfy the limits, over the cache's lifetime.  Explicit removal and flushing don't count.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of the cost limit in use.
    pub fn cost_utilization(&self) -> f64 {
        if self.total_cost_limit == 0 {
            0.0
        } else {
            self.total_cost as f64 / self.total_cost_limit as f64
        }
    }
}
