use std::sync::Arc;

use tokio::sync::broadcast;

use aichat_types::events::StoreEvent;

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_BUFFER: usize = 1024;

/// Fans store events out to every subscriber.
///
/// One dispatcher is shared by all stores of a client so a single
/// subscription observes the whole client state. Dropping a receiver
/// unsubscribes it.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<StoreEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to store events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all current subscribers.
    pub fn broadcast(&self, event: StoreEvent) {
        // No subscribers is not an error.
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
