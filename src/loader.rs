use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchController, BatchRules};
use crate::cache::SharedCache;
use crate::config::BatchConfig;
use crate::error::LoadError;
use crate::fetch::{CachedFetch, Upstream};
use crate::tracker::AttemptTracker;

/// The per-request loader.
///
/// Concurrent [`load`](BatchingLoader::load) calls are collected into batch
/// windows, so a key requested by several resolvers at once is fetched once.
/// Each batch is served from the [`SharedCache`] where possible and from the
/// [`Upstream`] otherwise. Every key requested through this loader is
/// recorded, which lets callers opt into single-flight suppression.
pub struct BatchingLoader<K, V, U>
where
    K: Debug + Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    U: Upstream<K, V>,
{
    controller: BatchController<K, CachedFetch<K, V, U>, Duration>,
    attempts: AttemptTracker<K>,
    cancel: CancellationToken,
}

impl<K, V, U> BatchingLoader<K, V, U>
where
    K: Debug + Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    U: Upstream<K, V>,
{
    pub fn new(
        cache: SharedCache<K, V>,
        upstream: Arc<U>,
        config: &BatchConfig,
        cancel: CancellationToken,
    ) -> Self {
        let rules = BatchRules {
            batcher: CachedFetch::new(cache, upstream),
            window: config.window,
            max_keys: config.max_keys,
        };

        Self {
            controller: BatchController::new(rules),
            attempts: AttemptTracker::new(),
            cancel,
        }
    }

    /// Load the value for `key`.
    ///
    /// The key is marked as attempted in this scope whatever the outcome.
    /// With `single_flight` set, a key that was already attempted resolves to
    /// `Ok(None)` straight away, without joining a batch. Otherwise the call
    /// waits for its batch window, which returns the cached value, the
    /// upstream value, or the upstream error for this key alone.
    pub async fn load(&self, key: K, single_flight: bool) -> Result<Option<V>, LoadError> {
        let already_attempted = self.attempts.check_and_mark(&key);

        if single_flight && already_attempted {
            tracing::debug!(?key, "already attempted in this scope, suppressing");
            return Ok(None);
        }

        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }

        tracing::trace!(?key, single_flight, already_attempted, "joining batch");
        let pending = self.controller.load(key);

        // Dropping `pending` on cancellation hands the batch over to whoever
        // else is still waiting on it.
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LoadError::Cancelled),
            outcome = pending => match outcome {
                Ok(outcome) => Ok(outcome?),
                Err(never) => match never {},
            },
        }
    }

    /// Load several keys at once, returning one result per key in input
    /// order.
    ///
    /// Every key goes through [`load`](BatchingLoader::load) without
    /// single-flight suppression, concurrently, so distinct keys share a
    /// window. Duplicate keys each get the value.
    pub async fn load_many(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Vec<Result<Option<V>, LoadError>> {
        let keys: Vec<K> = keys.into_iter().collect();
        tracing::debug!(count = keys.len(), "loading many");

        future::join_all(keys.into_iter().map(|key| self.load(key, false))).await
    }

    pub fn attempts(&self) -> &AttemptTracker<K> {
        &self.attempts
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
