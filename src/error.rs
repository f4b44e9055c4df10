use std::sync::Arc;

use thiserror::Error;

/// A single key failed at the upstream boundary.
///
/// Only the waiters for that key see this error; other keys in the same batch
/// are unaffected, and the failure is never cached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("upstream fetch failed: {message}")]
pub struct UpstreamError {
    message: Arc<str>,
}

impl UpstreamError {
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why a [`load`](crate::BatchingLoader::load) produced no value.
///
/// A suppressed single-flight lookup is not an error; it resolves to
/// `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("the request scope ended before the key was resolved")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config")]
    Parse(#[from] serde_yaml::Error),
}
