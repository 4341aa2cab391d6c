use std::hash::Hash;

use indexmap::IndexMap;

/// Capacity-bounded map with least-recently-used eviction.
///
/// Entries are kept in recency order: the front of the map is the oldest.
/// Reads through [`BoundedCache::get`] refresh an entry; [`BoundedCache::peek`]
/// does not.
#[derive(Debug, Clone)]
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: IndexMap<K, V>,
    capacity: usize,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let index = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, value)| value)
    }

    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces `key`, returning the entry evicted to stay within
    /// capacity, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.entries.shift_remove(&key);
        self.entries.insert(key, value);
        if self.entries.len() > self.capacity {
            return self.entries.shift_remove_index(0);
        }
        None
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key)
    }

    /// Keeps only the entries for which `keep` returns true and returns how
    /// many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, value| keep(key, value));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::BoundedCache;

    #[test]
    fn evicts_least_recently_used_entry() {
        let mut cache = BoundedCache::new(2);
        assert!(cache.insert("a", 1).is_none());
        assert!(cache.insert("b", 2).is_none());

        assert_eq!(cache.get(&"a"), Some(&1));
        let evicted = cache.insert("c", 3);

        assert_eq!(evicted, Some(("b", 2)));
        assert!(cache.contains_key(&"a"));
        assert!(cache.contains_key(&"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn insert_replaces_without_growing() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("a", 5);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&"a"), Some(&5));
    }

    #[test]
    fn peek_does_not_refresh_recency() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.peek(&"a"), Some(&1));
        assert_eq!(cache.insert("c", 3), Some(("a", 1)));
    }

    #[test]
    fn retain_reports_dropped_count() {
        let mut cache = BoundedCache::new(8);
        for value in 0..6 {
            cache.insert(value, value * 10);
        }
        let dropped = cache.retain(|key, _| key % 2 == 0);
        assert_eq!(dropped, 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut cache = BoundedCache::new(0);
        cache.insert(1, "x");
        cache.insert(2, "y");
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key(&2));
    }
}
