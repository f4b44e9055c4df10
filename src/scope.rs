use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::cache::{SharedCache, Sweeper};
use crate::config::{BatchConfig, Config};
use crate::fetch::Upstream;
use crate::loader::BatchingLoader;

/// Everything one inbound request needs to load data: its own
/// [`BatchingLoader`] (and with it, its own attempt tracker).
///
/// Create one per request with [`ScopeFactory::scope`] and pass it to every
/// resolver of that request. Clones share the same loader, so resolvers can
/// run on separate tasks. Call [`end`](RequestScope::end) (or hold the guard
/// from [`end_on_drop`](RequestScope::end_on_drop)) when the request
/// finishes; loads still waiting then fail with
/// [`LoadError::Cancelled`](crate::LoadError::Cancelled).
pub struct RequestScope<K, V, U>
where
    K: Debug + Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    U: Upstream<K, V>,
{
    loader: Arc<BatchingLoader<K, V, U>>,
    cancel: CancellationToken,
}

impl<K, V, U> Clone for RequestScope<K, V, U>
where
    K: Debug + Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    U: Upstream<K, V>,
{
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<K, V, U> RequestScope<K, V, U>
where
    K: Debug + Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    U: Upstream<K, V>,
{
    pub fn loader(&self) -> &BatchingLoader<K, V, U> {
        &self.loader
    }

    /// End the request: pending and future loads fail with `Cancelled`.
    pub fn end(&self) {
        self.cancel.cancel();
    }

    /// Ends the request when the returned guard is dropped.
    #[must_use]
    pub fn end_on_drop(&self) -> DropGuard {
        self.cancel.clone().drop_guard()
    }

    pub fn is_ended(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Process-wide state for handing out [`RequestScope`]s: the shared cache,
/// the upstream source, and the batch settings. Build it once at startup and
/// drop it at shutdown.
pub struct ScopeFactory<K, V, U> {
    cache: SharedCache<K, V>,
    upstream: Arc<U>,
    batch: BatchConfig,
    _sweeper: Option<Sweeper>,
}

impl<K, V, U> ScopeFactory<K, V, U>
where
    K: Debug + Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    U: Upstream<K, V>,
{
    /// Build a factory around an existing cache. Nothing sweeps the cache
    /// unless the caller does.
    pub fn new(cache: SharedCache<K, V>, upstream: Arc<U>, batch: BatchConfig) -> Self {
        Self {
            cache,
            upstream,
            batch,
            _sweeper: None,
        }
    }

    /// Build the shared cache from `config` and start sweeping it, when
    /// called within a tokio runtime and a sweep interval is configured.
    pub fn from_config(config: &Config, upstream: U) -> Self {
        let cache = SharedCache::new(&config.cache);

        let sweeper = match config.cache.sweep_interval {
            Some(interval) if !interval.is_zero() => {
                if tokio::runtime::Handle::try_current().is_ok() {
                    Some(cache.spawn_sweeper(interval))
                } else {
                    tracing::warn!("no tokio runtime, the shared cache will not be swept");
                    None
                }
            }
            _ => None,
        };

        Self {
            _sweeper: sweeper,
            ..Self::new(cache, Arc::new(upstream), config.batch.clone())
        }
    }

    pub fn cache(&self) -> &SharedCache<K, V> {
        &self.cache
    }

    /// A fresh scope for one request.
    pub fn scope(&self) -> RequestScope<K, V, U> {
        self.scope_with(CancellationToken::new())
    }

    /// A fresh scope that also ends when `parent` is cancelled, e.g. by the
    /// transport when the client goes away.
    pub fn scope_within(&self, parent: &CancellationToken) -> RequestScope<K, V, U> {
        self.scope_with(parent.child_token())
    }

    fn scope_with(&self, cancel: CancellationToken) -> RequestScope<K, V, U> {
        let loader = BatchingLoader::new(
            self.cache.clone(),
            self.upstream.clone(),
            &self.batch,
            cancel.clone(),
        );

        RequestScope {
            loader: Arc::new(loader),
            cancel,
        }
    }
}
