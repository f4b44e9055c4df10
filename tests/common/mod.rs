#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scopeloader::{
    BatchConfig, CacheConfig, Outcome, ScopeFactory, SharedCache, Upstream, UpstreamError,
};
use tracing_subscriber::{fmt, EnvFilter};

pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("scopeloader=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// An upstream that answers every key with its length, and records the keys
/// of every call it receives.
///
/// A few keys behave differently: `BROKEN` fails, `NONE` has no data, and
/// `MISSING` is left out of the response altogether.
#[derive(Debug, Default)]
pub struct RecordingUpstream {
    calls: Mutex<Vec<Vec<String>>>,
    latency: Duration,
}

impl RecordingUpstream {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// The keys of every call so far, each call's keys sorted.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Upstream<String, usize> for RecordingUpstream {
    async fn fetch(&self, mut keys: Vec<String>) -> HashMap<String, Outcome<usize>> {
        keys.sort();
        self.calls.lock().unwrap().push(keys.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        keys.into_iter()
            .filter(|key| key != "MISSING")
            .map(|key| {
                let outcome = match key.as_str() {
                    "BROKEN" => Err(UpstreamError::new("boom")),
                    "NONE" => Ok(None),
                    _ => Ok(Some(key.len())),
                };
                (key, outcome)
            })
            .collect()
    }
}

pub type TestScopes = ScopeFactory<String, usize, RecordingUpstream>;

pub fn cache_config(ttl: Duration) -> CacheConfig {
    CacheConfig {
        ttl,
        sweep_interval: None,
        max_capacity: None,
    }
}

pub fn batch_config() -> BatchConfig {
    BatchConfig {
        window: Duration::from_millis(5),
        max_keys: None,
    }
}

/// A factory over `upstream` with a long-lived cache and a short window.
pub fn factory(upstream: &Arc<RecordingUpstream>) -> TestScopes {
    factory_with_ttl(upstream, Duration::from_secs(60))
}

pub fn factory_with_ttl(upstream: &Arc<RecordingUpstream>, ttl: Duration) -> TestScopes {
    ScopeFactory::new(
        SharedCache::new(&cache_config(ttl)),
        Arc::clone(upstream),
        batch_config(),
    )
}

pub fn key(name: &str) -> String {
    name.to_owned()
}
