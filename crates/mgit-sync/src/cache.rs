//! Time-bounded cache with a size cap.
//!
//! Entries expire `ttl` after insertion. When full, the oldest-inserted
//! entry is evicted first. Callers needing shared access wrap it in a mutex.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<K, Entry<V>>,
    // insertion sequence -> key, oldest first
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

impl<K: Clone + Eq + Hash, V> TtlCache<K, V> {
    /// A cache holding at most `max_entries` (at least one) for `ttl` each.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &K, now: DateTime<Utc>) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| now - e.inserted_at <= self.ttl)
            .map(|e| &e.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Utc::now());
    }

    /// Insert or refresh `key`. A refreshed key counts as newly inserted.
    pub fn insert_at(&mut self, key: K, value: V, now: DateTime<Utc>) {
        if let Some(old) = self.entries.remove(&key) {
            self.order.remove(&old.seq);
        }
        while self.entries.len() >= self.max_entries {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                seq,
            },
        );
    }

    pub fn invalidate(&mut self, key: &K) {
        if let Some(old) = self.entries.remove(key) {
            self.order.remove(&old.seq);
        }
    }

    /// Drop every entry older than the TTL.
    pub fn prune_expired(&mut self) {
        let now = Utc::now();
        let ttl = self.ttl;
        let expired: Vec<u64> = self
            .entries
            .values()
            .filter(|e| now - e.inserted_at > ttl)
            .map(|e| e.seq)
            .collect();
        for seq in expired {
            if let Some(key) = self.order.remove(&seq) {
                self.entries.remove(&key);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
