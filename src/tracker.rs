use std::hash::Hash;

use dashmap::DashSet;

/// Remembers which keys have been requested within one request scope.
///
/// Every operation is atomic per key, so resolvers running concurrently
/// within the same request can race on a key and exactly one of them
/// observes it as unattempted.
#[derive(Debug)]
pub struct AttemptTracker<K: Eq + Hash> {
    attempted: DashSet<K>,
}

impl<K: Eq + Hash> Default for AttemptTracker<K> {
    fn default() -> Self {
        Self {
            attempted: DashSet::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> AttemptTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attempted(&self, key: &K) -> bool {
        self.attempted.contains(key)
    }

    /// Idempotent.
    pub fn mark_attempted(&self, key: &K) {
        self.check_and_mark(key);
    }

    /// Mark `key` as attempted and report whether it already was.
    pub fn check_and_mark(&self, key: &K) -> bool {
        if self.attempted.contains(key) {
            return true;
        }
        !self.attempted.insert(key.clone())
    }

    pub fn len(&self) -> usize {
        self.attempted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted.is_empty()
    }
}
