use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::RepositoryError;
use crate::models::Topic;

/// Result of a background update run for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    New,
    Changed,
    Unchanged,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicUpdate {
    pub topic: Topic,
    pub outcome: UpdateOutcome,
}

/// Publish/subscribe channel for update outcomes, shared by every repository
/// created from the same owner. Keeps the last outcome per topic so late
/// subscribers can opt into replaying it.
#[derive(Debug, Clone)]
pub struct UpdateNotifier {
    tx: broadcast::Sender<TopicUpdate>,
    last: Arc<Mutex<HashMap<Topic, UpdateOutcome>>>,
}

impl Default for UpdateNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl UpdateNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            last: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records and broadcasts an outcome. Returns how many subscriptions,
    /// across all topics, were listening.
    pub fn publish(&self, topic: Topic, outcome: UpdateOutcome) -> usize {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        last.insert(topic.clone(), outcome.clone());
        match self.tx.send(TopicUpdate { topic, outcome }) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(update)) => {
                debug!(topic = %update.topic, "update published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self, topic: Topic) -> UpdateSubscription {
        UpdateSubscription {
            topic,
            rx: self.tx.subscribe(),
            pending: None,
        }
    }

    /// Like [`subscribe`](Self::subscribe), but first yields the last outcome
    /// recorded for `topic`, if any.
    pub fn subscribe_with_replay(&self, topic: Topic) -> UpdateSubscription {
        let last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let pending = last.get(&topic).cloned();
        UpdateSubscription {
            topic,
            rx: self.tx.subscribe(),
            pending,
        }
    }

    pub fn last_outcome(&self, topic: &Topic) -> Option<UpdateOutcome> {
        let last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        last.get(topic).cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Outcomes for a single topic. Dropping it deregisters from the notifier.
#[derive(Debug)]
pub struct UpdateSubscription {
    topic: Topic,
    rx: broadcast::Receiver<TopicUpdate>,
    pending: Option<UpdateOutcome>,
}

impl UpdateSubscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub async fn recv(&mut self) -> Result<UpdateOutcome, RepositoryError> {
        if let Some(outcome) = self.pending.take() {
            return Ok(outcome);
        }
        loop {
            match self.rx.recv().await {
                Ok(update) if update.topic == self.topic => return Ok(update.outcome),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "update subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(RepositoryError::UpdateChannelClosed)
                }
            }
        }
    }
}
