//! Delivery loop for the shared subscription
//!
//! Every delivery is handled in its own task. Deliveries are not serialized,
//! so results and notifications may complete in any order.

use futures::{Stream, StreamExt};
use lapin::Consumer;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, warn};

use crate::error::{AnalyzerError, Result};
use crate::handler::{IngestionHandler, Outcome};

/// Consume the broker subscription until it ends or fails
pub async fn run_subscription(consumer: Consumer, handler: Arc<IngestionHandler>) -> Result<()> {
    let deliveries = consumer.map(|delivery| delivery.map(|delivery| delivery.data).map_err(AnalyzerError::from));
    drive_deliveries(deliveries, handler).await
}

/// Hand each payload of `deliveries` to the handler
///
/// Returns once the stream ends and every in-flight payload has been handled.
/// A stream error marks the subscription inactive and is returned.
pub async fn drive_deliveries<S>(mut deliveries: S, handler: Arc<IngestionHandler>) -> Result<()>
where
    S: Stream<Item = Result<Vec<u8>>> + Unpin,
{
    let mut in_flight: JoinSet<Outcome> = JoinSet::new();

    let result = loop {
        tokio::select! {
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => reap(joined),
            next = deliveries.next() => match next {
                Some(Ok(payload)) => {
                    let handler = Arc::clone(&handler);
                    in_flight.spawn(async move { handler.handle_delivery(&payload).await });
                }
                Some(Err(e)) => {
                    error!("Subscription failed: {}", e);
                    handler.stats().record_error(format!("subscription failed: {}", e)).await;
                    break Err(e);
                }
                None => {
                    warn!("Subscription stream ended");
                    break Ok(());
                }
            },
        }
    };

    handler.stats().set_subscribed(false);

    while let Some(joined) = in_flight.join_next().await {
        reap(joined);
    }

    result
}

fn reap(joined: std::result::Result<Outcome, JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Message handler panicked: {}", e);
        }
    }
}
