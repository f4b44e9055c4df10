use std::time::Duration;

use chrono::Local;
use futures::stream::{self, Stream};
use tokio::time::{self, Instant, Interval};
use tokio_util::sync::CancellationToken;

use crate::resolvers::SymbolDefinition;

/// `Subscription.symbolUpdates`
///
/// Emits an updated definition every `interval`, cycling through `names` in
/// order, until `cancel` fires. Resolving fields of the emitted definitions
/// goes through the subscription's scope like any other caller.
///
/// Must be called from within a tokio runtime.
pub fn symbol_updates(
    names: Vec<String>,
    interval: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = SymbolDefinition> + Send + 'static {
    tracing::debug!(count = names.len(), "starting symbol updates");

    let period = interval.max(Duration::from_millis(1));
    let ticker = time::interval_at(Instant::now() + period, period);

    stream::unfold(
        (names, ticker, 0),
        move |(names, mut ticker, index): (Vec<String>, Interval, usize)| {
            let cancel = cancel.clone();
            async move {
                if names.is_empty() {
                    return None;
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("subscription ended, stopping updates");
                        None
                    }
                    _ = ticker.tick() => {
                        let name = names[index].clone();
                        let now = Local::now().format("%-I:%M%p");
                        let description = format!("Updated Description for Symbol {name} at {now}");
                        tracing::trace!(%name, "sending update");

                        let next = (index + 1) % names.len();
                        Some((SymbolDefinition::new(name, description), (names, ticker, next)))
                    }
                }
            }
        },
    )
}
