//! The process-wide L2 cache shared by every request scope.

use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::CacheConfig;

/// A time-bounded key-value store shared by all request scopes.
///
/// Entries expire a fixed TTL after they were last written; an expired entry
/// is never returned, whether or not it has been purged yet. Values are
/// cloned out, so callers never hold a reference into the cache. Only present
/// values are stored: a lookup that found nothing upstream is not remembered.
///
/// The handle is cheap to clone, and clones share the same storage.
pub struct SharedCache<K, V> {
    entries: moka::sync::Cache<K, V>,
    ttl: Duration,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            ttl: self.ttl,
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        let mut builder = moka::sync::Cache::builder().time_to_live(config.ttl);
        if let Some(max_capacity) = config.max_capacity {
            builder = builder.max_capacity(max_capacity);
        }

        Self {
            entries: builder.build(),
            ttl: config.ttl,
        }
    }

    /// Store `value` under `key`, replacing any existing entry and restarting
    /// its TTL.
    pub fn set(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// The value stored under `key`, unless it is missing or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Purge expired entries now.
    pub fn sweep(&self) {
        self.entries.run_pending_tasks();
    }

    /// Start a task that purges expired entries every `interval` (at least
    /// every millisecond). The task stops when the returned [`Sweeper`] is
    /// dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> Sweeper {
        let period = interval.max(Duration::from_millis(1));
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep();
                tracing::trace!(entries = cache.entries.entry_count(), "swept shared cache");
            }
        });

        Sweeper { task }
    }
}

/// Handle to the background sweep task of a [`SharedCache`].
#[derive(Debug)]
pub struct Sweeper {
    task: JoinHandle<()>,
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}
