use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Broadcast publisher for scheduling events (ready instances, run outcomes)
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub id: Uuid,
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event with the given name and context.
    ///
    /// Publishing with no subscribers succeeds; the event is dropped.
    pub fn publish(&self, event_name: impl Into<String>, context: Value) -> Uuid {
        let event = PublishedEvent {
            id: Uuid::new_v4(),
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };
        let id = event.id;

        if self.sender.send(event).is_err() {
            tracing::trace!(event_id = %id, "Event published without subscribers");
        }
        id
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
