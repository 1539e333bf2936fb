use evcare_realtime::application::services::connection_manager::{
    MESSAGES_SUBSCRIPTION, NOTIFICATIONS_SUBSCRIPTION, UNREAD_COUNT_SUBSCRIPTION,
};
use evcare_realtime::domain::ports::transport::{Transport, TransportLink};
use evcare_realtime::infrastructure::stomp::{StompCommand, StompFrame};
use evcare_realtime::{ChatMessage, Notification, RealtimeError, RealtimeResult};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Server side of one connection opened through [`MockTransport`]
pub struct ServerEnd {
    pub to_client: mpsc::UnboundedSender<RealtimeResult<String>>,
    pub from_client: mpsc::UnboundedReceiver<String>,
    pub user_id: String,
}

impl ServerEnd {
    /// Next non-heartbeat frame the client sent, or None once the client hung up
    pub async fn next_frame(&mut self) -> Option<StompFrame> {
        loop {
            let text = self.from_client.recv().await?;
            if let Ok(Some(frame)) = StompFrame::parse(&text) {
                return Some(frame);
            }
        }
    }

    pub async fn expect(&mut self, command: StompCommand) -> StompFrame {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.next_frame())
            .await
            .expect("Timed out waiting for a client frame")
            .expect("Client closed the connection");
        assert_eq!(frame.command, command, "unexpected frame: {:?}", frame);
        frame
    }

    /// Client closed its side (dropped the outbound sender)
    pub async fn closed(&mut self) -> bool {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.from_client.recv().await.is_some() {}
        })
        .await
        .is_ok()
    }

    pub fn reply(&self, frame: StompFrame) {
        let _ = self.to_client.send(Ok(frame.encode()));
    }

    /// Answer CONNECT and swallow the three SUBSCRIBE frames; returns their destinations
    pub async fn handshake(&mut self) -> Vec<String> {
        self.expect(StompCommand::Connect).await;
        self.reply(
            StompFrame::new(StompCommand::Connected)
                .header("version", "1.2")
                .header("heart-beat", "0,0"),
        );
        let mut destinations = Vec::new();
        for _ in 0..3 {
            let frame = self.expect(StompCommand::Subscribe).await;
            destinations.push(frame.get("destination").unwrap_or_default().to_string());
        }
        destinations
    }

    pub fn push_json<T: Serialize>(&self, subscription: &str, queue: &str, body: &T) {
        let body = serde_json::to_string(body).expect("Failed to serialize payload");
        self.reply(
            StompFrame::new(StompCommand::Message)
                .header("subscription", subscription)
                .header("destination", format!("/user/{}/queue/{}", self.user_id, queue))
                .header("message-id", "m-1")
                .header("content-type", "application/json")
                .body(body),
        );
    }

    pub fn push_message(&self, message: &ChatMessage) {
        self.push_json(MESSAGES_SUBSCRIPTION, "messages", message);
    }

    pub fn push_unread(&self, count: u64) {
        self.push_json(
            UNREAD_COUNT_SUBSCRIPTION,
            "unread-count",
            &serde_json::json!({ "unreadCount": count }),
        );
    }

    pub fn push_notification(&self, notification: &Notification) {
        self.push_json(NOTIFICATIONS_SUBSCRIPTION, "notifications", notification);
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.to_client.send(Ok(text.to_string()));
    }

    /// Abrupt transport failure
    pub fn fail(&self, reason: &str) {
        let _ = self
            .to_client
            .send(Err(RealtimeError::Transport(reason.to_string())));
    }

    /// Orderly close from the server
    pub fn close(self) {}
}

/// Transport double: every open either fails or yields a [`ServerEnd`] on the returned channel
pub struct MockTransport {
    opens: AtomicUsize,
    refuse: AtomicBool,
    servers: mpsc::UnboundedSender<ServerEnd>,
    user_id: String,
}

impl MockTransport {
    pub fn new(user_id: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            opens: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            servers,
            user_id: user_id.to_string(),
        });
        (transport, rx)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str) -> RealtimeResult<TransportLink> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RealtimeError::Transport("connection refused".to_string()));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let _ = self.servers.send(ServerEnd {
            to_client,
            from_client,
            user_id: self.user_id.clone(),
        });
        Ok(TransportLink { outbound, inbound })
    }
}
