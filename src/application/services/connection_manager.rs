//! One STOMP-over-WebSocket session per logged-in user.
//!
//! States run `Disconnected → Connecting → Connected`, falling back to `Disconnected` on any
//! close or error. While attempts remain, a fixed-delay timer moves the manager through
//! `Reconnecting` back to `Connecting`; once the ceiling is hit it reports
//! [`RealtimeError::ReconnectExhausted`] and stays down until the next explicit `connect`.
//!
//! Every session and timer carries a generation number. `connect` and `disconnect` bump it,
//! so a stale session or timer can never mutate state, and `disconnect` aborts the timer task.

use crate::config::ConnectionSettings;
use crate::domain::entities::{
    ChatMessage, MarkReadRequest, Notification, SendMessageRequest, UnreadCountPayload,
};
use crate::domain::errors::{RealtimeError, RealtimeResult};
use crate::domain::ports::time_service::TimeService;
use crate::domain::ports::transport::{Transport, TransportLink};
use crate::infrastructure::stomp::{StompCommand, StompFrame};
use crate::shared::events::{
    EventBus, EventFanout, HandlerId, LocalEventBus, RealtimeEvent, RealtimeHandler,
};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const MESSAGES_SUBSCRIPTION: &str = "sub-messages";
pub const UNREAD_COUNT_SUBSCRIPTION: &str = "sub-unread-count";
pub const NOTIFICATIONS_SUBSCRIPTION: &str = "sub-notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Messages,
    UnreadCount,
    Notifications,
}

enum SessionEnd {
    Cancelled,
    Lost(RealtimeError),
}

struct Inner {
    state: ConnectionState,
    user_id: Option<String>,
    reconnect_attempts: u32,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    session_cancel: Option<CancellationToken>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl Inner {
    /// Invalidate the current session and any pending timer; returns the previous state
    fn stop_session(&mut self) -> ConnectionState {
        self.generation += 1;
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(cancel) = self.session_cancel.take() {
            cancel.cancel();
        }
        self.outbound = None;
        std::mem::replace(&mut self.state, ConnectionState::Disconnected)
    }
}

/// Shared handle to the realtime connection; clones refer to the same session
#[derive(Clone)]
pub struct ConnectionManager {
    settings: Arc<ConnectionSettings>,
    transport: Arc<dyn Transport>,
    time: Arc<dyn TimeService>,
    inner: Arc<Mutex<Inner>>,
    fanout: Arc<EventFanout>,
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        transport: Arc<dyn Transport>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            transport,
            time,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                user_id: None,
                reconnect_attempts: 0,
                generation: 0,
                outbound: None,
                session_cancel: None,
                reconnect_timer: None,
            })),
            fanout: Arc::new(EventFanout::new(LocalEventBus::default())),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().await.reconnect_attempts
    }

    pub async fn current_user(&self) -> Option<String> {
        self.inner.lock().await.user_id.clone()
    }

    /// Add a consumer's callback set
    pub async fn register(&self, handler: Arc<dyn RealtimeHandler>) -> HandlerId {
        self.fanout.register(handler).await
    }

    pub async fn unregister(&self, id: HandlerId) -> bool {
        self.fanout.unregister(id).await
    }

    /// Stream of every event, for consumers that prefer polling over callbacks
    pub fn events(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<RealtimeEvent, BroadcastStreamRecvError>> + Send>> {
        self.fanout.bus().subscribe()
    }

    /// Open the session for `user_id` and subscribe to its three queues.
    ///
    /// Connecting for the user already connected (or connecting) does nothing. An explicit call
    /// resets the attempt counter, which is the only way out of the exhausted state.
    pub async fn connect(&self, user_id: &str) {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            warn!("connect called without a user id; ignoring");
            return;
        }

        let mut inner = self.inner.lock().await;
        let same_user = inner.user_id.as_deref() == Some(user_id);
        if same_user
            && matches!(
                inner.state,
                ConnectionState::Connecting | ConnectionState::Connected
            )
        {
            debug!(user_id, state = ?inner.state, "Already connecting or connected");
            return;
        }
        let previous = inner.stop_session();
        let previous_user = inner.user_id.replace(user_id.to_string());
        inner.reconnect_attempts = 0;
        inner.state = ConnectionState::Connecting;
        let generation = inner.generation;
        let cancel = CancellationToken::new();
        inner.session_cancel = Some(cancel.clone());
        drop(inner);

        if previous == ConnectionState::Connected && !same_user {
            if let Some(old) = previous_user {
                info!(user_id = %old, "Switching realtime session to another user");
                self.fanout
                    .emit(RealtimeEvent::Disconnected { user_id: old })
                    .await;
            }
        }

        info!(user_id, url = %self.settings.ws_url, "Connecting to realtime endpoint");
        self.spawn_session(user_id.to_string(), generation, cancel);
    }

    /// Tear the session down and cancel any pending reconnect. Idempotent.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        let previous = inner.stop_session();
        let user_id = inner.user_id.take();
        inner.reconnect_attempts = 0;
        drop(inner);

        match (previous, user_id) {
            (ConnectionState::Connected, Some(user_id)) => {
                info!(user_id = %user_id, "Realtime session closed");
                self.fanout
                    .emit(RealtimeEvent::Disconnected { user_id })
                    .await;
            }
            (ConnectionState::Disconnected, _) => debug!("disconnect: already disconnected"),
            (state, _) => debug!(?state, "disconnect: cancelled pending session"),
        }
    }

    /// Send a chat message over the transport; `Err(NotConnected)` tells the caller to fall back
    pub async fn send(&self, request: &SendMessageRequest) -> RealtimeResult<()> {
        let frame = StompFrame::send_json(&self.settings.send_destination, request)?;
        self.transmit(frame).await
    }

    /// Send a read receipt over the transport; same contract as [`ConnectionManager::send`]
    pub async fn mark_read(&self, request: &MarkReadRequest) -> RealtimeResult<()> {
        let frame = StompFrame::send_json(&self.settings.mark_read_destination, request)?;
        self.transmit(frame).await
    }

    async fn transmit(&self, frame: StompFrame) -> RealtimeResult<()> {
        let inner = self.inner.lock().await;
        match (inner.state, inner.outbound.as_ref()) {
            (ConnectionState::Connected, Some(outbound)) => outbound
                .send(frame.encode())
                .map_err(|_| RealtimeError::Transport("connection already closed".to_string())),
            _ => Err(RealtimeError::NotConnected),
        }
    }

    fn spawn_session(&self, user_id: String, generation: u64, cancel: CancellationToken) {
        let manager = self.clone();
        tokio::spawn(async move {
            match manager.drive_session(&user_id, generation, &cancel).await {
                SessionEnd::Cancelled => debug!(generation, "Realtime session cancelled"),
                SessionEnd::Lost(reason) => {
                    manager
                        .handle_connection_lost(&user_id, generation, reason)
                        .await
                }
            }
        });
    }

    async fn drive_session(
        &self,
        user_id: &str,
        generation: u64,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            opened = self.transport.open(&self.settings.ws_url) => opened,
        };
        let TransportLink {
            outbound,
            mut inbound,
        } = match opened {
            Ok(link) => link,
            Err(e) => return SessionEnd::Lost(e),
        };

        let connect = StompFrame::connect(
            &self.settings.stomp_host(),
            self.settings.heartbeat.as_millis() as u64,
            self.settings.auth_token.as_deref(),
        );
        if outbound.send(connect.encode()).is_err() {
            return SessionEnd::Lost(RealtimeError::Transport(
                "connection closed before handshake".to_string(),
            ));
        }

        let mut heartbeat: Option<Interval> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let receipt = format!("disconnect-{}", generation);
                    let _ = outbound.send(StompFrame::disconnect(&receipt).encode());
                    return SessionEnd::Cancelled;
                }
                _ = next_beat(&mut heartbeat) => {
                    if outbound.send("\n".to_string()).is_err() {
                        return SessionEnd::Lost(RealtimeError::Transport(
                            "connection closed".to_string(),
                        ));
                    }
                }
                received = inbound.recv() => {
                    let text = match received {
                        None => {
                            return SessionEnd::Lost(RealtimeError::Transport(
                                "connection closed by peer".to_string(),
                            ))
                        }
                        Some(Err(e)) => return SessionEnd::Lost(e),
                        Some(Ok(text)) => text,
                    };
                    let frame = match StompFrame::parse(&text) {
                        Ok(Some(frame)) => frame,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("Dropping unparseable frame: {}", e);
                            continue;
                        }
                    };
                    if cancel.is_cancelled() {
                        return SessionEnd::Cancelled;
                    }
                    match frame.command {
                        StompCommand::Connected => {
                            if let Err(end) = self.on_handshake(user_id, generation, &outbound).await {
                                return end;
                            }
                            if !self.settings.heartbeat.is_zero() {
                                let period = self.settings.heartbeat;
                                heartbeat = Some(tokio::time::interval_at(Instant::now() + period, period));
                            }
                        }
                        StompCommand::Message => self.route_message(&frame, user_id).await,
                        StompCommand::Error => {
                            let reason = frame
                                .get("message")
                                .map(str::to_string)
                                .unwrap_or_else(|| frame.body.clone());
                            let error = RealtimeError::Broker(reason);
                            self.fanout.emit(RealtimeEvent::Error(error.clone())).await;
                            return SessionEnd::Lost(error);
                        }
                        StompCommand::Receipt => {
                            debug!(receipt = frame.get("receipt-id").unwrap_or_default(), "Receipt");
                        }
                        other => debug!("Ignoring unexpected {} frame", other),
                    }
                }
            }
        }
    }

    /// CONNECTED arrived: subscribe, reset the counter, tell consumers.
    /// `Err(Cancelled)` if this session was superseded meanwhile, `Err(Lost)` if the link died.
    async fn on_handshake(
        &self,
        user_id: &str,
        generation: u64,
        outbound: &mpsc::UnboundedSender<String>,
    ) -> Result<(), SessionEnd> {
        let subscriptions = [
            (MESSAGES_SUBSCRIPTION, &self.settings.messages_destination),
            (UNREAD_COUNT_SUBSCRIPTION, &self.settings.unread_count_destination),
            (NOTIFICATIONS_SUBSCRIPTION, &self.settings.notifications_destination),
        ];

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return Err(SessionEnd::Cancelled);
        }
        for (id, template) in subscriptions {
            let destination = ConnectionSettings::destination_for(template, user_id);
            if outbound
                .send(StompFrame::subscribe(id, &destination).encode())
                .is_err()
            {
                return Err(SessionEnd::Lost(RealtimeError::Transport(
                    "connection closed while subscribing".to_string(),
                )));
            }
            debug!(subscription = id, %destination, "Subscribed");
        }
        inner.state = ConnectionState::Connected;
        inner.reconnect_attempts = 0;
        inner.outbound = Some(outbound.clone());
        drop(inner);

        info!(user_id, "Realtime connection established");
        self.fanout
            .emit(RealtimeEvent::Connected {
                user_id: user_id.to_string(),
            })
            .await;
        Ok(())
    }

    async fn route_message(&self, frame: &StompFrame, user_id: &str) {
        let Some(channel) = self.channel_of(frame, user_id) else {
            debug!(
                destination = frame.get("destination").unwrap_or_default(),
                "MESSAGE for unknown subscription"
            );
            return;
        };

        let event = match channel {
            Channel::Messages => {
                serde_json::from_str::<ChatMessage>(&frame.body).map(RealtimeEvent::Message)
            }
            Channel::UnreadCount => serde_json::from_str::<UnreadCountPayload>(&frame.body)
                .map(|payload| RealtimeEvent::UnreadCount(payload.count())),
            Channel::Notifications => serde_json::from_str::<Notification>(&frame.body)
                .map(RealtimeEvent::Notification),
        };

        match event {
            Ok(event) => {
                debug!(kind = event.kind(), "Inbound event");
                self.fanout.emit(event).await;
            }
            Err(e) => warn!(?channel, "Dropping malformed payload: {}", e),
        }
    }

    fn channel_of(&self, frame: &StompFrame, user_id: &str) -> Option<Channel> {
        match frame.get("subscription") {
            Some(MESSAGES_SUBSCRIPTION) => return Some(Channel::Messages),
            Some(UNREAD_COUNT_SUBSCRIPTION) => return Some(Channel::UnreadCount),
            Some(NOTIFICATIONS_SUBSCRIPTION) => return Some(Channel::Notifications),
            _ => {}
        }
        let destination = frame.get("destination")?;
        let matches = |template: &str| ConnectionSettings::destination_for(template, user_id) == destination;
        if matches(&self.settings.messages_destination) {
            Some(Channel::Messages)
        } else if matches(&self.settings.unread_count_destination) {
            Some(Channel::UnreadCount)
        } else if matches(&self.settings.notifications_destination) {
            Some(Channel::Notifications)
        } else {
            None
        }
    }

    async fn handle_connection_lost(&self, user_id: &str, generation: u64, reason: RealtimeError) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            debug!(generation, "Ignoring close of a superseded session");
            return;
        }
        let was_connected = inner.state == ConnectionState::Connected;
        inner.outbound = None;
        inner.session_cancel = None;
        inner.state = ConnectionState::Disconnected;
        warn!(user_id, error = %reason, "Realtime connection lost");

        let terminal = if inner.reconnect_attempts < self.settings.max_reconnect_attempts {
            inner.reconnect_attempts += 1;
            inner.state = ConnectionState::Reconnecting;
            let attempt = inner.reconnect_attempts;
            inner.reconnect_timer =
                Some(self.spawn_reconnect_timer(user_id.to_string(), generation, attempt));
            None
        } else {
            Some(RealtimeError::ReconnectExhausted {
                attempts: inner.reconnect_attempts,
            })
        };
        drop(inner);

        if was_connected {
            self.fanout
                .emit(RealtimeEvent::Disconnected {
                    user_id: user_id.to_string(),
                })
                .await;
        }
        if let Some(terminal) = terminal {
            error!(user_id, "{}", terminal);
            self.fanout.emit(RealtimeEvent::Error(terminal)).await;
        }
    }

    fn spawn_reconnect_timer(&self, user_id: String, generation: u64, attempt: u32) -> JoinHandle<()> {
        let manager = self.clone();
        let delay = self.settings.reconnect_delay;
        info!(
            attempt,
            max = self.settings.max_reconnect_attempts,
            "Reconnecting in {:?}",
            delay
        );
        tokio::spawn(async move {
            manager.time.sleep(delay).await;
            manager.resume(user_id, generation).await;
        })
    }

    /// Timer fired: start the next attempt unless someone intervened
    async fn resume(&self, user_id: String, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != ConnectionState::Reconnecting {
            return;
        }
        // Dropping our own handle detaches, it does not abort
        inner.reconnect_timer = None;
        inner.generation += 1;
        let generation = inner.generation;
        inner.state = ConnectionState::Connecting;
        let cancel = CancellationToken::new();
        inner.session_cancel = Some(cancel.clone());
        drop(inner);

        self.spawn_session(user_id, generation, cancel);
    }
}

async fn next_beat(heartbeat: &mut Option<Interval>) {
    match heartbeat.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
