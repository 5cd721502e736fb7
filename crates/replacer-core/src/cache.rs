//! Bounded, TTL-aware LRU cache.
//!
//! Entries live in a slab and are threaded onto an intrusive doubly-linked
//! recency list (head = most recently used, tail = least recently used).
//! The lookup index and the list are guarded by a single mutex.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default maximum number of entries.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Default entry time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Values that can be stored in an [`LruCache`].
///
/// Empty values are never cached.
pub trait CacheValue: Clone + Send {
    /// Whether this value should be treated as absent.
    fn is_empty_value(&self) -> bool {
        false
    }
}

impl CacheValue for String {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl CacheValue for Vec<u8> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: CacheValue> CacheValue for Option<T> {
    fn is_empty_value(&self) -> bool {
        self.as_ref().map_or(true, T::is_empty_value)
    }
}

struct Entry<V> {
    key: String,
    value: Option<V>,
    created: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner<V> {
    items: HashMap<String, usize>,
    // Vacant slots have `value == None` and are listed in `free`.
    slots: Vec<Entry<V>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> Inner<V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            items: HashMap::with_capacity(capacity),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    /// Inserts a fresh entry at the head.
    fn add(&mut self, key: String, value: V) {
        let entry = Entry {
            key: key.clone(),
            value: Some(value),
            created: Instant::now(),
            prev: None,
            next: self.head,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = entry;
                idx
            }
            None => {
                self.slots.push(entry);
                self.slots.len() - 1
            }
        };

        match self.head {
            Some(old_head) => self.slots[old_head].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.items.insert(key, idx);
    }

    /// Detaches a node from the recency list without freeing it.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }

        let entry = &mut self.slots[idx];
        entry.prev = None;
        entry.next = None;
    }

    /// Frees a slot and returns its key.
    fn remove(&mut self, idx: usize) -> String {
        self.unlink(idx);
        let entry = &mut self.slots[idx];
        entry.value = None;
        let key = std::mem::take(&mut entry.key);
        self.items.remove(&key);
        self.free.push(idx);
        key
    }

    fn promote(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);

        let old_head = self.head;
        self.slots[idx].next = old_head;
        if let Some(h) = old_head {
            self.slots[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn evict(&mut self) -> Option<String> {
        let tail = self.tail?;
        Some(self.remove(tail))
    }
}

/// A thread-safe in-memory LRU cache with a per-entry time-to-live.
///
/// Expired entries are only dropped when a read discovers them; capacity
/// eviction always removes the least recently used entry.
///
/// # Example
///
/// ```
/// use replacer_core::LruCache;
/// use std::time::Duration;
///
/// let cache = LruCache::new(2, Duration::from_secs(60));
/// cache.set("a", "1".to_string());
/// cache.set("b", "2".to_string());
/// cache.get("a");
/// cache.set("c", "3".to_string());
///
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.get("a").as_deref(), Some("1"));
/// ```
pub struct LruCache<V> {
    max_size: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: CacheValue> Default for LruCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL)
    }
}

impl<V: CacheValue> LruCache<V> {
    /// Create a cache holding at most `max_size` entries, each valid for `ttl`.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size,
            ttl,
            inner: Mutex::new(Inner::with_capacity(max_size)),
        }
    }

    /// Maximum number of entries.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Entry time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up `key`, promoting it to most recently used.
    ///
    /// Returns `None` if the key is absent or its entry has expired; an
    /// expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let idx = *inner.items.get(key)?;

        if inner.slots[idx].created.elapsed() > self.ttl {
            inner.remove(idx);
            debug!(key, "cache entry expired");
            return None;
        }

        inner.promote(idx);
        inner.slots[idx].value.clone()
    }

    /// Insert or replace `key`. Empty values are ignored.
    ///
    /// Replacing resets the entry's age. Inserting a new key into a full
    /// cache evicts the least recently used entry first.
    pub fn set(&self, key: impl Into<String>, value: V) {
        if value.is_empty_value() || self.max_size == 0 {
            return;
        }
        let key = key.into();
        let mut inner = self.lock();

        if let Some(&idx) = inner.items.get(&key) {
            inner.remove(idx);
        } else if inner.len() >= self.max_size {
            if let Some(evicted) = inner.evict() {
                debug!(key = %evicted, "cache entry evicted");
            }
        }

        inner.add(key, value);
    }

    /// Remove `key` if present.
    pub fn delete(&self, key: &str) {
        let mut inner = self.lock();
        if let Some(&idx) = inner.items.get(key) {
            inner.remove(idx);
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        *self.lock() = Inner::with_capacity(self.max_size);
    }

    /// Number of entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn backdate(cache: &LruCache<String>, key: &str, age: Duration) {
        let mut inner = cache.lock();
        let idx = inner.items[key];
        inner.slots[idx].created = Instant::now().checked_sub(age).unwrap();
    }

    fn keys_mru_to_lru(cache: &LruCache<String>) -> Vec<String> {
        let inner = cache.lock();
        let mut keys = Vec::new();
        let mut cursor = inner.head;
        while let Some(idx) = cursor {
            let entry = &inner.slots[idx];
            keys.push(entry.key.clone());
            cursor = entry.next;
        }
        keys
    }

    #[test]
    fn test_add_entries() {
        let cache = LruCache::default();
        cache.set("key1", "value1".to_string());
        cache.set("key2", "value2".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("key1").as_deref(), Some("value1"));
        assert_eq!(cache.get("key2").as_deref(), Some("value2"));
    }

    #[test]
    fn test_delete_entries() {
        let cache = LruCache::default();
        cache.set("key1", "value1".to_string());
        cache.set("key2", "value2".to_string());
        cache.delete("key1");
        cache.delete("missing");

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("key1"), None);
        assert_eq!(cache.get("key2").as_deref(), Some("value2"));
    }

    #[test]
    fn test_evicts_oldest_without_reads() {
        let cache = LruCache::new(3, DEFAULT_CACHE_TTL);
        cache.set("key1", "value1".to_string());
        cache.set("key2", "value2".to_string());
        cache.set("key3", "value3".to_string());
        cache.set("key4", "value4".to_string());

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("key1"), None);
        assert_eq!(cache.get("key2").as_deref(), Some("value2"));
        assert_eq!(cache.get("key3").as_deref(), Some("value3"));
        assert_eq!(cache.get("key4").as_deref(), Some("value4"));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = LruCache::new(3, DEFAULT_CACHE_TTL);
        cache.set("key1", "value1".to_string());
        cache.set("key2", "value2".to_string());
        cache.set("key3", "value3".to_string());
        cache.get("key2");
        cache.get("key1");
        cache.get("key3");
        cache.set("key4", "value4".to_string());

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("key2"), None);
        assert_eq!(cache.get("key1").as_deref(), Some("value1"));
        assert_eq!(cache.get("key3").as_deref(), Some("value3"));
        assert_eq!(cache.get("key4").as_deref(), Some("value4"));
    }

    #[test]
    fn test_recency_order() {
        let cache = LruCache::new(4, DEFAULT_CACHE_TTL);
        for key in ["a", "b", "c", "d"] {
            cache.set(key, key.to_uppercase());
        }
        cache.get("b");
        cache.get("d");
        cache.set("a", "A2".to_string());

        assert_eq!(keys_mru_to_lru(&cache), vec!["a", "d", "b", "c"]);
    }

    const SHORT_TTL: Duration = Duration::from_secs(1);

    #[test]
    fn test_replace_resets_age_and_promotes() {
        let cache = LruCache::new(2, SHORT_TTL);
        cache.set("key1", "old".to_string());
        cache.set("key2", "value2".to_string());
        backdate(&cache, "key1", SHORT_TTL * 2);

        cache.set("key1", "new".to_string());
        cache.set("key3", "value3".to_string());

        assert_eq!(cache.get("key1").as_deref(), Some("new"));
        assert_eq!(cache.get("key2"), None);
    }

    #[test]
    fn test_expires_entries_past_ttl() {
        let cache = LruCache::new(8, SHORT_TTL);
        cache.set("key1", "value1".to_string());
        backdate(&cache, "key1", SHORT_TTL + Duration::from_millis(1));
        cache.set("key2", "value2".to_string());
        backdate(&cache, "key2", SHORT_TTL / 2);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("key1"), None);
        assert_eq!(cache.get("key2").as_deref(), Some("value2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_empty_values_are_not_cached() {
        let cache: LruCache<String> = LruCache::default();
        cache.set("key1", String::new());
        assert!(cache.is_empty());

        let optional: LruCache<Option<String>> = LruCache::default();
        optional.set("key1", None);
        assert!(optional.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = LruCache::default();
        cache.set("key1", "value1".to_string());
        cache.set("key2", "value2".to_string());
        cache.clear();

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get("key1"), None);
        assert_eq!(cache.get("key2"), None);

        cache.set("key3", "value3".to_string());
        assert_eq!(cache.get("key3").as_deref(), Some("value3"));
    }

    #[test]
    fn test_slots_are_reused() {
        let cache = LruCache::new(2, DEFAULT_CACHE_TTL);
        for i in 0..100 {
            cache.set(format!("key{}", i), format!("value{}", i));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.lock().slots.len() <= 3);
        assert_eq!(keys_mru_to_lru(&cache), vec!["key99", "key98"]);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(LruCache::new(64, DEFAULT_CACHE_TTL));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("k{}", (t * 7 + i) % 100);
                        cache.set(key.clone(), format!("v{}", i));
                        cache.get(&key);
                        if i % 13 == 0 {
                            cache.delete(&key);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64);
        assert_eq!(keys_mru_to_lru(&cache).len(), cache.len());
    }
}
