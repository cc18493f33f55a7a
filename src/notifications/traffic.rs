//! Fan-out of session traffic counters to real-time observers.
//!
//! One broadcast channel carries every message; each subscriber keeps its own set of
//! joined topics and drops the rest. Delivery is best-effort: slow subscribers lose
//! messages rather than slowing the publisher down.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::db::entities::session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficUpdate {
    pub download: i64,
    pub upload: i64,
    pub uptime: Option<String>,
}

impl From<&session::Model> for TrafficUpdate {
    fn from(model: &session::Model) -> Self {
        Self {
            download: model.download,
            upload: model.upload,
            uptime: model.uptime.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicMessage {
    pub topic: String,
    pub payload: TrafficUpdate,
}

pub fn session_topic(session_id: &str) -> String {
    format!("session_{session_id}")
}

#[derive(Debug, Clone)]
pub struct TrafficNotifier {
    tx: broadcast::Sender<Arc<TopicMessage>>,
}

impl TrafficNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes the session's counters on `session_{id}`. Never blocks; returns how many
    /// subscribers the message reached (zero when nobody is listening).
    pub fn publish(&self, model: &session::Model) -> usize {
        let message = Arc::new(TopicMessage {
            topic: session_topic(&model.session_id),
            payload: TrafficUpdate::from(model),
        });
        match self.tx.send(message) {
            Ok(receivers) => {
                debug!(session_id = %model.session_id, receivers, "Published traffic update.");
                receivers
            }
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> TopicSubscription {
        TopicSubscription {
            rx: self.tx.subscribe(),
            topics: HashSet::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One observer's view of the channel.
pub struct TopicSubscription {
    rx: broadcast::Receiver<Arc<TopicMessage>>,
    topics: HashSet<String>,
}

impl TopicSubscription {
    pub fn join(&mut self, session_id: &str) {
        self.topics.insert(session_topic(session_id));
    }

    pub fn leave(&mut self, session_id: &str) {
        self.topics.remove(&session_topic(session_id));
    }

    pub fn is_joined(&self, session_id: &str) -> bool {
        self.topics.contains(&session_topic(session_id))
    }

    /// Waits for the next message on a joined topic. `None` once the notifier is dropped.
    pub async fn recv(&mut self) -> Option<Arc<TopicMessage>> {
        loop {
            match self.rx.recv().await {
                Ok(message) if self.topics.contains(&message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Traffic subscriber lagged; messages dropped.");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
