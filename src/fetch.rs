//! The boundary between a batch and the upstream data source.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::batch::Batcher;
use crate::cache::SharedCache;
use crate::data::{KeySet, ValueSet};
use crate::error::UpstreamError;

/// The result for one key: a value, no data, or a failure for that key only.
pub type Outcome<V> = Result<Option<V>, UpstreamError>;

/// An upstream data source that can look up many keys in one call.
///
/// Each key gets its own outcome. Keys missing from the returned map are
/// treated as having no data. Retrying, if any, is up to the implementation.
#[async_trait]
pub trait Upstream<K, V>: Send + Sync + 'static {
    async fn fetch(&self, keys: Vec<K>) -> HashMap<K, Outcome<V>>;
}

/// The batch function of every loader: serve what it can from the
/// [`SharedCache`], fetch the rest from the [`Upstream`] in a single call, and
/// cache every value that comes back.
pub struct CachedFetch<K, V, U> {
    cache: SharedCache<K, V>,
    upstream: Arc<U>,
}

impl<K, V, U> Clone for CachedFetch<K, V, U> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            upstream: self.upstream.clone(),
        }
    }
}

impl<K, V, U> CachedFetch<K, V, U>
where
    K: Debug + Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    U: Upstream<K, V>,
{
    pub fn new(cache: SharedCache<K, V>, upstream: Arc<U>) -> Self {
        Self { cache, upstream }
    }

    #[tracing::instrument(skip_all, fields(keys = keys.len()))]
    async fn fetch(self, keys: KeySet<K>) -> ValueSet<Outcome<V>> {
        let mut outcomes = HashMap::with_capacity(keys.len());
        let mut misses = Vec::new();

        for key in keys.keys() {
            match self.cache.get(key) {
                Some(value) => {
                    tracing::trace!(?key, "shared cache hit");
                    outcomes.insert(key.clone(), Ok(Some(value)));
                }
                None => {
                    tracing::trace!(?key, "shared cache miss");
                    misses.push(key.clone());
                }
            }
        }

        if !misses.is_empty() {
            tracing::debug!(keys = ?misses, "fetching from upstream");
            let mut fetched = self.upstream.fetch(misses.clone()).await;

            for key in misses {
                let outcome = fetched.remove(&key).unwrap_or(Ok(None));
                match &outcome {
                    Ok(Some(value)) => self.cache.set(key.clone(), value.clone()),
                    Ok(None) => tracing::debug!(?key, "upstream has no data"),
                    Err(error) => tracing::warn!(?key, %error, "upstream fetch failed"),
                }
                outcomes.insert(key, outcome);
            }
        }

        keys.into_values(|key| outcomes.remove(key).unwrap_or(Ok(None)))
    }
}

impl<K, V, U> Batcher<K> for CachedFetch<K, V, U>
where
    K: Debug + Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    U: Upstream<K, V>,
{
    type Value = Outcome<V>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<ValueSet<Outcome<V>>, Infallible>>;

    fn batch(&self, keys: KeySet<K>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.fetch(keys).await) })
    }
}
