//! Origin cache event bus, consumed by streaming clients.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::news::Domain;

/// Events emitted by the origin cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NewsEvent {
    /// A domain's live item set was replaced by a successful upstream fetch.
    Refreshed { domain: Domain, items: usize },
    /// The upstream provider rate limited a refresh.
    RateLimited { domain: Domain, message: String },
    /// A refresh failed and stale data is being served.
    Degraded { domain: Domain, error: String },
    /// Items arrived through the streaming ingest path.
    Ingested { domain: Domain, accepted: usize },
}

impl NewsEvent {
    pub fn domain(&self) -> Domain {
        match self {
            NewsEvent::Refreshed { domain, .. }
            | NewsEvent::RateLimited { domain, .. }
            | NewsEvent::Degraded { domain, .. }
            | NewsEvent::Ingested { domain, .. } => *domain,
        }
    }
}

/// Broadcast-based event bus for origin cache events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NewsEvent>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every subscriber. A bus nobody listens to drops the event.
    pub fn send(&self, event: NewsEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NewsEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
