use serde_json::Value;
use tokio::sync::broadcast;

use crate::constants::DEFAULT_EVENT_CAPACITY;
use crate::messaging::ContextId;

/// Broadcast publisher for dispatcher lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<WorkerEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct WorkerEvent {
    pub name: String,
    pub request_id: Option<String>,
    pub context: ContextId,
    pub detail: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(
        &self,
        name: impl Into<String>,
        request_id: Option<&str>,
        context: &ContextId,
        detail: Value,
    ) {
        let event = WorkerEvent {
            name: name.into(),
            request_id: request_id.map(String::from),
            context: context.clone(),
            detail,
            published_at: chrono::Utc::now(),
        };

        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
