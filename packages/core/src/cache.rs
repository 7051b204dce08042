use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// In-memory TTL cache keyed by `K`.
///
/// Entries are only returned while younger than the TTL; `purge_expired`
/// drops the rest. Not synchronised: wrap in a lock to share.
pub struct TtlCache<K, V> {
    entries: HashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Returns the cached value only when still within TTL.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .get(key)
            .filter(|(_, stored_at)| stored_at.elapsed() <= self.ttl)
            .map(|(value, _)| value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(value, _)| value)
    }

    /// Values that are still within TTL.
    pub fn fresh_values(&self) -> impl Iterator<Item = &V> + '_ {
        let ttl = self.ttl;
        self.entries
            .values()
            .filter(move |(_, stored_at)| stored_at.elapsed() <= ttl)
            .map(|(value, _)| value)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, (_, stored_at)| stored_at.elapsed() <= ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
