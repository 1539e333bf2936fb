use crate::domain::entities::{ChatMessage, Notification};
use crate::domain::errors::RealtimeError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Everything the connection manager reports to its consumers
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Message(ChatMessage),
    Notification(Notification),
    UnreadCount(u64),
    Connected { user_id: String },
    Disconnected { user_id: String },
    Error(RealtimeError),
}

impl RealtimeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeEvent::Message(_) => "message",
            RealtimeEvent::Notification(_) => "notification",
            RealtimeEvent::UnreadCount(_) => "unread_count",
            RealtimeEvent::Connected { .. } => "connected",
            RealtimeEvent::Disconnected { .. } => "disconnected",
            RealtimeEvent::Error(_) => "error",
        }
    }

    /// Invoke exactly the one callback matching this event
    pub async fn dispatch_to(&self, handler: &dyn RealtimeHandler) {
        match self {
            RealtimeEvent::Message(message) => handler.on_message(message).await,
            RealtimeEvent::Notification(notification) => {
                handler.on_notification(notification).await
            }
            RealtimeEvent::UnreadCount(count) => handler.on_unread_count(*count).await,
            RealtimeEvent::Connected { user_id } => handler.on_connected(user_id).await,
            RealtimeEvent::Disconnected { user_id } => handler.on_disconnected(user_id).await,
            RealtimeEvent::Error(error) => handler.on_error(error).await,
        }
    }
}

/// Callback set a UI surface registers with the connection manager.
///
/// Every method defaults to a no-op so surfaces only implement what they display. Surfaces do
/// their own filtering; the manager delivers every event to every handler.
#[async_trait]
pub trait RealtimeHandler: Send + Sync {
    async fn on_message(&self, _message: &ChatMessage) {}

    async fn on_notification(&self, _notification: &Notification) {}

    async fn on_unread_count(&self, _count: u64) {}

    async fn on_connected(&self, _user_id: &str) {}

    async fn on_disconnected(&self, _user_id: &str) {}

    async fn on_error(&self, _error: &RealtimeError) {}
}

/// Event bus trait for stream-style consumers
pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers
    fn publish(&self, event: RealtimeEvent);

    /// Subscribe to events
    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<RealtimeEvent, BroadcastStreamRecvError>> + Send>>;
}

/// Local in-memory implementation of EventBus
#[derive(Clone)]
pub struct LocalEventBus {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl LocalEventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventBus for LocalEventBus {
    fn publish(&self, event: RealtimeEvent) {
        // Nobody listening is normal for a library consumer that only uses handlers
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("No stream subscribers for {} event", e.0.kind());
        }
    }

    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<RealtimeEvent, BroadcastStreamRecvError>> + Send>> {
        let rx = self.tx.subscribe();
        Box::pin(BroadcastStream::new(rx))
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Token returned by [`EventFanout::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Delivers each event to every registered handler, then to stream subscribers
pub struct EventFanout {
    handlers: Mutex<Vec<(HandlerId, Arc<dyn RealtimeHandler>)>>,
    bus: LocalEventBus,
    next_id: AtomicU64,
}

impl EventFanout {
    pub fn new(bus: LocalEventBus) -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            bus,
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn register(&self, handler: Arc<dyn RealtimeHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().await.push((id, handler));
        id
    }

    /// Returns false if the handler was already gone
    pub async fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock().await;
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.lock().await.len()
    }

    pub fn bus(&self) -> &LocalEventBus {
        &self.bus
    }

    /// Handlers run in registration order, outside the registry lock so they may
    /// register, unregister or call back into the manager.
    pub async fn emit(&self, event: RealtimeEvent) {
        let handlers: Vec<Arc<dyn RealtimeHandler>> = self
            .handlers
            .lock()
            .await
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            event.dispatch_to(handler.as_ref()).await;
        }
        self.bus.publish(event);
    }
}

impl Default for EventFanout {
    fn default() -> Self {
        Self::new(LocalEventBus::default())
    }
}
