//! Field resolvers for dividend data, independent of any particular GraphQL
//! server. The transport layer creates a [`DividendScope`] per request and
//! passes it in.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::LoadError;
use crate::scope::{RequestScope, ScopeFactory};
use crate::upstream::SimulatedDividendSource;
use crate::Config;

pub type DividendScope = RequestScope<String, DateTime<Utc>, SimulatedDividendSource>;
pub type DividendScopes = ScopeFactory<String, DateTime<Utc>, SimulatedDividendSource>;

impl DividendScopes {
    /// The factory for the simulated dividend source described by `config`.
    pub fn simulated(config: &Config) -> Self {
        Self::from_config(config, SimulatedDividendSource::from_config(&config.upstream))
    }
}

/// A financial instrument. Its next ex-dividend date is resolved separately,
/// see [`next_ex_dividend_date`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SymbolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
        }
    }
}

/// `Query.symbols`
pub fn symbols<S: AsRef<str>>(names: &[S]) -> Vec<SymbolDefinition> {
    tracing::debug!(count = names.len(), "resolving symbols");

    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            SymbolDefinition::new(name, format!("Description for Symbol {name}"))
        })
        .collect()
}

/// `SymbolDefinition.nextExDividendDate(singleFlight)`
///
/// Single flight is on unless the query turns it off.
pub async fn next_ex_dividend_date(
    scope: &DividendScope,
    symbol: &SymbolDefinition,
    single_flight: Option<bool>,
) -> Result<Option<DateTime<Utc>>, LoadError> {
    scope
        .loader()
        .load(symbol.name.clone(), single_flight.unwrap_or(true))
        .await
}
