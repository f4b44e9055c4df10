//! A stand-in for the dividend data provider.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use futures_timer::Delay;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use crate::fetch::{Outcome, Upstream};

/// Answers "next ex-dividend date" lookups with fixed offsets from now.
///
/// AAPL is one month out, MSFT two, GOOG three, and every other symbol six.
/// Each call waits for the configured latency once, however many symbols it
/// asks for.
#[derive(Debug, Clone)]
pub struct SimulatedDividendSource {
    latency: Duration,
}

impl SimulatedDividendSource {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(config.latency)
    }

    fn months_ahead(symbol: &str) -> u32 {
        match symbol {
            "AAPL" => 1,
            "MSFT" => 2,
            "GOOG" => 3,
            _ => 6,
        }
    }

    /// The date reported for `symbol`, counted from `now`.
    pub fn next_date(symbol: &str, now: DateTime<Utc>) -> Outcome<DateTime<Utc>> {
        let months = Self::months_ahead(symbol);
        now.checked_add_months(Months::new(months))
            .map(Some)
            .ok_or_else(|| UpstreamError::new(format!("no date {months} months after {now}")))
    }
}

#[async_trait]
impl Upstream<String, DateTime<Utc>> for SimulatedDividendSource {
    async fn fetch(&self, keys: Vec<String>) -> HashMap<String, Outcome<DateTime<Utc>>> {
        Delay::new(self.latency).await;

        let now = Utc::now();
        keys.into_iter()
            .map(|symbol| {
                let outcome = Self::next_date(&symbol, now);
                (symbol, outcome)
            })
            .collect()
    }
}
