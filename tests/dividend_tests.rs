//! End-to-end lookups of ex-dividend dates through the resolvers, the way a
//! GraphQL request or subscription would make them.

use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use futures::StreamExt;
use scopeloader::{
    next_ex_dividend_date, symbol_updates, symbols, Config, DividendScopes, LoadError,
    UpstreamConfig,
};
use tokio_util::sync::CancellationToken;

mod common;
use common::setup;

fn config() -> Config {
    Config {
        upstream: UpstreamConfig {
            latency: Duration::from_millis(10),
        },
        ..Config::default()
    }
}

/// Checks that `date` is `months` after some instant between `before` and
/// `after`.
fn assert_months_ahead(
    date: DateTime<Utc>,
    months: u32,
    before: DateTime<Utc>,
    after: DateTime<Utc>,
) {
    assert!(date >= before + Months::new(months), "{date} is too early");
    assert!(date <= after + Months::new(months), "{date} is too late");
}

#[tokio::test]
async fn next_date_is_fetched_once_per_request() {
    setup();
    let factory = DividendScopes::simulated(&config());
    let resolved = symbols(&["AAPL"]);
    let aapl = &resolved[0];

    let scope = factory.scope();
    let before = Utc::now();
    let date = next_ex_dividend_date(&scope, aapl, None)
        .await
        .unwrap()
        .unwrap();
    let after = Utc::now();
    assert_months_ahead(date, 1, before, after);

    // Single flight is on by default.
    assert_eq!(next_ex_dividend_date(&scope, aapl, None).await, Ok(None));
    assert_eq!(
        next_ex_dividend_date(&scope, aapl, Some(false)).await,
        Ok(Some(date))
    );

    // The next request is served the cached date.
    let scope = factory.scope();
    assert_eq!(
        next_ex_dividend_date(&scope, aapl, None).await,
        Ok(Some(date))
    );
}

#[tokio::test]
async fn unknown_symbols_are_six_months_out() {
    setup();
    let factory = DividendScopes::simulated(&config());
    let scope = factory.scope();

    let before = Utc::now();
    let results = scope
        .loader()
        .load_many(["AAPL", "MSFT", "UNKNOWN"].map(String::from))
        .await;
    let after = Utc::now();

    let dates: Vec<DateTime<Utc>> = results
        .into_iter()
        .map(|result| result.unwrap().unwrap())
        .collect();

    assert_months_ahead(dates[0], 1, before, after);
    assert_months_ahead(dates[1], 2, before, after);
    assert_months_ahead(dates[2], 6, before, after);
}

#[tokio::test]
async fn resolvers_in_one_request_share_a_batch() {
    setup();
    let factory = DividendScopes::simulated(&config());
    let scope = factory.scope();
    let resolved = symbols(&["AAPL", "GOOG", "AAPL"]);

    // Every field of the same query resolves concurrently; the repeated
    // symbol is suppressed.
    let dates = futures::future::join_all(
        resolved
            .iter()
            .map(|symbol| next_ex_dividend_date(&scope, symbol, None)),
    )
    .await;

    assert!(matches!(dates[0], Ok(Some(_))));
    assert!(matches!(dates[1], Ok(Some(_))));
    assert_eq!(dates[2], Ok(None));
    assert_eq!(factory.cache().get(&"GOOG".to_owned()), dates[1].clone().unwrap());
}

#[tokio::test]
async fn ended_requests_stop_resolving() {
    setup();
    let factory = DividendScopes::simulated(&config());
    let scope = factory.scope();
    let resolved = symbols(&["MSFT"]);
    let msft = &resolved[0];

    scope.end();
    assert_eq!(
        next_ex_dividend_date(&scope, msft, None).await,
        Err(LoadError::Cancelled)
    );
}

#[tokio::test]
async fn subscription_updates_resolve_through_their_scope() {
    setup();
    let factory = DividendScopes::simulated(&config());

    let subscription = CancellationToken::new();
    let scope = factory.scope_within(&subscription);
    let updates = symbol_updates(
        vec!["AAPL".to_owned(), "MSFT".to_owned()],
        Duration::from_millis(20),
        subscription.clone(),
    );
    futures::pin_mut!(updates);

    let mut dates = Vec::new();
    for _ in 0..3 {
        let symbol = updates.next().await.unwrap();
        dates.push(next_ex_dividend_date(&scope, &symbol, None).await);
    }

    assert!(matches!(dates[0], Ok(Some(_))));
    assert!(matches!(dates[1], Ok(Some(_))));

    // The subscription already looked up AAPL.
    assert_eq!(dates[2], Ok(None));

    subscription.cancel();
    assert!(updates.next().await.is_none());
    assert!(scope.is_ended());
}
