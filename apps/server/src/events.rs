use serde_json::Value;
use tokio::sync::broadcast;

/// Event name clients listen for on the SSE stream.
pub const CACHE_INVALIDATE: &str = "cache:invalidate";

/// Sent to a client that fell behind the bus; it should refetch everything.
pub const CACHE_RESYNC: &str = "cache:resync";

/// Event name plus JSON payload, as sent to browsers.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    pub name: &'static str,
    pub payload: Value,
}

impl ServerEvent {
    pub fn new(name: &'static str, payload: Value) -> Self {
        Self { name, payload }
    }
}

/// Broadcast bus fanning server events out to every connected client.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of connected listeners.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: ServerEvent) {
        // No listeners is not an error; lagging listeners skip ahead.
        let _ = self.sender.send(event);
    }
}
