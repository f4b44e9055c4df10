//! Scopeloader serves per-key lookups (such as "the next ex-dividend date of
//! symbol X") to many concurrent requests without one upstream call per
//! lookup. It layers three things:
//!
//! - a per-request [`BatchingLoader`], which collects the keys requested
//!   during a short window into a single batch, so a key asked for by several
//!   resolvers at once is fetched once;
//! - a process-wide [`SharedCache`] with a fixed TTL, consulted by every
//!   batch before it goes upstream, so a key fetched by one request is served
//!   to the next without another upstream call;
//! - a per-request [`AttemptTracker`], which lets a caller opt into
//!   single-flight suppression: only the first lookup of a key in a request
//!   does any work, and later ones resolve to nothing.
//!
//! ## Overview
//!
//! Start with an [`Upstream`], the source that can answer many keys in one
//! call, each key with its own outcome:
//!
//! ```
//! use std::collections::HashMap;
//! use async_trait::async_trait;
//! use scopeloader::{Outcome, Upstream, UpstreamError};
//!
//! struct Prices;
//!
//! #[async_trait]
//! impl Upstream<String, u64> for Prices {
//!     async fn fetch(&self, keys: Vec<String>) -> HashMap<String, Outcome<u64>> {
//!         keys.into_iter()
//!             .map(|key| {
//!                 let outcome = match key.as_str() {
//!                     "BROKEN" => Err(UpstreamError::new("no quote")),
//!                     _ => Ok(Some(key.len() as u64)),
//!                 };
//!                 (key, outcome)
//!             })
//!             .collect()
//!     }
//! }
//! ```
//!
//! Then build a [`ScopeFactory`] once at startup. It owns the shared cache,
//! and hands out one [`RequestScope`] per inbound request. The scope is passed
//! explicitly to every resolver of that request:
//!
//! ```
//! # use std::collections::HashMap;
//! # use async_trait::async_trait;
//! # use scopeloader::{Outcome, Upstream};
//! # struct Prices;
//! # #[async_trait]
//! # impl Upstream<String, u64> for Prices {
//! #     async fn fetch(&self, keys: Vec<String>) -> HashMap<String, Outcome<u64>> {
//! #         keys.into_iter().map(|key| { let n = key.len() as u64; (key, Ok(Some(n))) }).collect()
//! #     }
//! # }
//! use scopeloader::{Config, ScopeFactory};
//!
//! # futures::executor::block_on(async {
//! let factory = ScopeFactory::from_config(&Config::default(), Prices);
//!
//! let scope = factory.scope();
//! let loader = scope.loader();
//!
//! // Both lookups land in the same window and share one upstream call.
//! let (a, b) = futures::join!(
//!     loader.load("AAPL".to_owned(), false),
//!     loader.load("AAPL".to_owned(), false),
//! );
//! assert_eq!(a, Ok(Some(4)));
//! assert_eq!(b, Ok(Some(4)));
//!
//! // With single flight on, a key already requested in this scope resolves
//! // to nothing.
//! assert_eq!(loader.load("AAPL".to_owned(), true).await, Ok(None));
//!
//! // A new scope starts with a clean slate, and is served from the cache.
//! let scope = factory.scope();
//! assert_eq!(scope.loader().load("AAPL".to_owned(), true).await, Ok(Some(4)));
//! # });
//! ```
//!
//! ## Design notes
//!
//! ### `KeySet` and `ValueSet`
//!
//! A batch function receives a [`KeySet`] of distinct keys and answers with a
//! [`ValueSet`], which can only be created from that `KeySet`. That way every
//! waiting lookup is guaranteed to find an answer, and duplicate keys are
//! collapsed before the batch function ever sees them. Values are cloned once
//! per extra waiter on the same key.
//!
//! ### Poll-driven batches
//!
//! Batches are driven by polling the [`BatchFuture`]s waiting on them, not by
//! a background task. Only one future per batch (the most recently polled
//! one) is woken to advance the window and the fetch; when it is dropped,
//! another waiter is woken to take its place. Cancelling one lookup therefore
//! never disturbs the others sharing its batch, and a batch nobody waits on
//! any more is dropped, fetch included.
//!
//! ### Cancellation
//!
//! Every scope carries a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! Ending the scope makes the loads still waiting return
//! [`LoadError::Cancelled`] right away.

mod batch;
mod cache;
mod config;
mod data;
mod error;
mod fetch;
mod loader;
mod resolvers;
mod scope;
mod tracker;
mod updates;
mod upstream;
mod wakerset;

pub use batch::{BatchController, BatchFuture, BatchRules, Batcher, Window};
pub use cache::{SharedCache, Sweeper};
pub use config::{BatchConfig, CacheConfig, Config, UpdatesConfig, UpstreamConfig};
pub use data::{KeySet, ValueSet};
pub use error::{ConfigError, LoadError, UpstreamError};
pub use fetch::{CachedFetch, Outcome, Upstream};
pub use loader::BatchingLoader;
pub use resolvers::{
    next_ex_dividend_date, symbols, DividendScope, DividendScopes, SymbolDefinition,
};
pub use scope::{RequestScope, ScopeFactory};
pub use tracker::AttemptTracker;
pub use updates::symbol_updates;
pub use upstream::SimulatedDividendSource;
