//! Client-side query cache with optimistic writes.
//!
//! Entries expire by the freshness window of their key. The clock is always
//! passed in (`now: Instant`), so the cache itself never reads time.

use super::QueryKey;
use std::collections::BTreeMap;
use std::time::Instant;

/// A cached value and when it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, key: QueryKey, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < key.freshness()
    }
}

/// The prior state of a key overwritten by `apply_optimistic`.
///
/// Hand it back to `rollback` if the server rejects the write, or to
/// `confirm` once it succeeds.
#[derive(Debug)]
#[must_use = "an optimistic snapshot must be rolled back or confirmed"]
pub struct OptimisticSnapshot<V> {
    key: QueryKey,
    previous: Option<CacheEntry<V>>,
}

impl<V> OptimisticSnapshot<V> {
    #[must_use]
    pub fn key(&self) -> QueryKey {
        self.key
    }
}

/// Cache of query results keyed by `QueryKey`.
#[derive(Debug, Clone)]
pub struct QueryCache<V> {
    entries: BTreeMap<QueryKey, CacheEntry<V>>,
}

impl<V> Default for QueryCache<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V: Clone> QueryCache<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value, if present and still fresh.
    #[must_use]
    pub fn get(&self, key: QueryKey, now: Instant) -> Option<&V> {
        self.entries
            .get(&key)
            .filter(|e| e.is_fresh(key, now))
            .map(|e| &e.value)
    }

    /// The cached value regardless of freshness.
    #[must_use]
    pub fn peek(&self, key: QueryKey) -> Option<&V> {
        self.entries.get(&key).map(|e| &e.value)
    }

    pub fn insert(&mut self, key: QueryKey, value: V, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    /// Drop every listed key. Returns how many entries were present.
    pub fn invalidate<I: IntoIterator<Item = QueryKey>>(&mut self, keys: I) -> usize {
        keys.into_iter()
            .filter(|key| self.entries.remove(key).is_some())
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write `value` ahead of the server, remembering what it replaced.
    pub fn apply_optimistic(
        &mut self,
        key: QueryKey,
        value: V,
        now: Instant,
    ) -> OptimisticSnapshot<V> {
        let previous = self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
            },
        );
        OptimisticSnapshot { key, previous }
    }

    /// Restore the entry (or its absence) from before `apply_optimistic`.
    pub fn rollback(&mut self, snapshot: OptimisticSnapshot<V>) {
        tracing::debug!(key = ?snapshot.key, "rolling back optimistic update");
        match snapshot.previous {
            Some(entry) => {
                self.entries.insert(snapshot.key, entry);
            }
            None => {
                self.entries.remove(&snapshot.key);
            }
        }
    }

    /// Keep the optimistic value; the snapshot is discarded.
    pub fn confirm(&mut self, snapshot: OptimisticSnapshot<V>) {
        let OptimisticSnapshot { key, .. } = snapshot;
        tracing::trace!(key = ?key, present = self.entries.contains_key(&key), "confirmed optimistic update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GoalId;
    use std::time::Duration;

    #[test]
    fn entries_expire_with_their_window() {
        let t0 = Instant::now();
        let mut cache = QueryCache::new();
        cache.insert(QueryKey::Dashboard, 1, t0);
        cache.insert(QueryKey::CategoryList, 2, t0);

        let later = t0 + Duration::from_secs(31);
        assert_eq!(cache.get(QueryKey::Dashboard, later), None);
        assert_eq!(cache.get(QueryKey::CategoryList, later), Some(&2));
        assert_eq!(cache.peek(QueryKey::Dashboard), Some(&1));
    }

    #[test]
    fn invalidate_counts_present_keys() {
        let t0 = Instant::now();
        let mut cache = QueryCache::new();
        cache.insert(QueryKey::GoalList, 1, t0);
        cache.insert(QueryKey::GoalDetail(GoalId(1)), 2, t0);

        let dropped = cache.invalidate([QueryKey::GoalList, QueryKey::GoalTree]);
        assert_eq!(dropped, 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn rollback_restores_previous_value() {
        let t0 = Instant::now();
        let mut cache = QueryCache::new();
        cache.insert(QueryKey::GoalDetail(GoalId(1)), "before", t0);

        let snapshot = cache.apply_optimistic(QueryKey::GoalDetail(GoalId(1)), "after", t0);
        assert_eq!(cache.peek(QueryKey::GoalDetail(GoalId(1))), Some(&"after"));

        cache.rollback(snapshot);
        assert_eq!(cache.peek(QueryKey::GoalDetail(GoalId(1))), Some(&"before"));
    }

    #[test]
    fn rollback_of_new_key_removes_it() {
        let t0 = Instant::now();
        let mut cache = QueryCache::new();
        let snapshot = cache.apply_optimistic(QueryKey::GoalList, 7, t0);
        cache.rollback(snapshot);
        assert!(cache.is_empty());
    }

    #[test]
    fn confirm_keeps_optimistic_value() {
        let t0 = Instant::now();
        let mut cache = QueryCache::new();
        let snapshot = cache.apply_optimistic(QueryKey::Profile, 3, t0);
        assert_eq!(snapshot.key(), QueryKey::Profile);
        cache.confirm(snapshot);
        assert_eq!(cache.get(QueryKey::Profile, t0), Some(&3));
    }
}
