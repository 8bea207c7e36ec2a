use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::RepositoryError;
use crate::feed::RssUseCases;
use crate::models::Topic;
use crate::notifier::{UpdateNotifier, UpdateOutcome};

/// Handle to the background update loop started by [`spawn_update_poller`].
pub struct PollerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn stop(self) -> Result<(), RepositoryError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(RepositoryError::from)
    }
}

/// Polls every topic of `source` once per `interval` and publishes the
/// outcome of each poll on `notifier`.
pub fn spawn_update_poller(
    runtime: &Handle,
    source: Arc<RssUseCases>,
    notifier: UpdateNotifier,
    interval: Duration,
) -> PollerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick fires immediately; repositories load on activation
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("update poller shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    poll_all(&source, &source.topics(), &notifier).await;
                }
            }
        }
    });

    PollerHandle { cancel_tx, join }
}

/// Polls each topic once and returns the outcomes in topic order.
pub async fn poll_all(
    source: &RssUseCases,
    topics: &[Topic],
    notifier: &UpdateNotifier,
) -> Vec<(Topic, UpdateOutcome)> {
    let mut outcomes = Vec::with_capacity(topics.len());
    for topic in topics {
        let outcome = source.poll_topic(topic, notifier).await;
        debug!(topic = %topic, ?outcome, "topic polled");
        outcomes.push((topic.clone(), outcome));
    }
    outcomes
}
