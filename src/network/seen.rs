// Bounded record of gossip already processed

use lru::LruCache;
use std::num::NonZeroUsize;

/// Least-recently-used set of message content keys
pub struct SeenCache {
    entries: LruCache<String, ()>,
}

impl SeenCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Record `key`; returns true if it had not been seen
    pub fn insert(&mut self, key: &str) -> bool {
        self.entries.put(key.to_string(), ()).is_none()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
