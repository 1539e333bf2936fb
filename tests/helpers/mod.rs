#![allow(dead_code)]
#![allow(unused_imports)]
pub mod fakes;
pub mod mock_transport;

pub use fakes::*;
pub use mock_transport::*;

use evcare_realtime::domain::ports::{AssignmentApi, MessageApi, NotificationApi, TimeService, UserNotifier};
use evcare_realtime::{
    ConnectionManager, ConnectionSettings, RealtimeEvent, RealtimeSession, SessionPorts,
};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<RealtimeEvent, BroadcastStreamRecvError>> + Send>>;

/// Connection settings for tests: no heart-beats, default reconnect policy
pub fn test_settings() -> ConnectionSettings {
    ConnectionSettings {
        heartbeat: Duration::ZERO,
        ..ConnectionSettings::new("ws://test.invalid/ws")
    }
}

/// Everything a test needs around one user's connection
pub struct Harness {
    pub user_id: String,
    pub transport: Arc<MockTransport>,
    pub servers: mpsc::UnboundedReceiver<ServerEnd>,
    pub connection: ConnectionManager,
    pub messages: Arc<FakeMessageApi>,
    pub assignments: Arc<FakeAssignmentApi>,
    pub notifications: Arc<FakeNotificationApi>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new(user_id: &str) -> Self {
        Self::with_apis(user_id, FakeMessageApi::default(), FakeAssignmentApi::default())
    }

    pub fn with_apis(user_id: &str, messages: FakeMessageApi, assignments: FakeAssignmentApi) -> Self {
        let (transport, servers) = MockTransport::new(user_id);
        let clock = Arc::new(FixedClock::new(at(0)));
        let connection = ConnectionManager::new(
            test_settings(),
            transport.clone(),
            clock.clone() as Arc<dyn TimeService>,
        );
        Self {
            user_id: user_id.to_string(),
            transport,
            servers,
            connection,
            messages: Arc::new(messages),
            assignments: Arc::new(assignments),
            notifications: Arc::new(FakeNotificationApi::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            clock,
        }
    }

    pub fn session(&self) -> RealtimeSession {
        let ports = SessionPorts {
            message_api: self.messages.clone() as Arc<dyn MessageApi>,
            assignment_api: self.assignments.clone() as Arc<dyn AssignmentApi>,
            notification_api: self.notifications.clone() as Arc<dyn NotificationApi>,
            notifier: self.notifier.clone() as Arc<dyn UserNotifier>,
            time: self.clock.clone() as Arc<dyn TimeService>,
        };
        RealtimeSession::new(
            self.user_id.clone(),
            self.connection.clone(),
            ports,
            50,
            Duration::from_secs(5),
        )
        .expect("Failed to create session")
    }

    pub async fn next_server(&mut self) -> ServerEnd {
        tokio::time::timeout(Duration::from_secs(10), self.servers.recv())
            .await
            .expect("Timed out waiting for a transport open")
            .expect("Transport dropped")
    }

    /// Connect and complete the STOMP handshake; returns the live server end
    pub async fn connect(&mut self) -> ServerEnd {
        let mut events = self.connection.events();
        self.connection.connect(&self.user_id).await;
        let mut server = self.next_server().await;
        server.handshake().await;
        wait_for(&mut events, "connected").await;
        server
    }
}

/// Wait for the next event of `kind`; handlers have run once it shows up on the stream
pub async fn wait_for(events: &mut EventStream, kind: &str) -> RealtimeEvent {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match events.next().await {
                Some(Ok(event)) if event.kind() == kind => return event,
                Some(_) => continue,
                None => panic!("Event stream ended"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {} event", kind))
}
