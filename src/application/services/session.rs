use crate::{
    application::services::admin_inbox::AdminInbox,
    application::services::chat_widget::ChatWidget,
    application::services::connection_manager::{ConnectionManager, ConnectionState},
    application::services::message_dispatcher::MessageDispatcher,
    application::services::notification_bell::NotificationBell,
    domain::errors::{RealtimeError, RealtimeResult},
    domain::ports::assignment_api::AssignmentApi,
    domain::ports::message_api::MessageApi,
    domain::ports::notification_api::NotificationApi,
    domain::ports::time_service::TimeService,
    domain::ports::user_notifier::UserNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Outbound collaborators of a session
#[derive(Clone)]
pub struct SessionPorts {
    pub message_api: Arc<dyn MessageApi>,
    pub assignment_api: Arc<dyn AssignmentApi>,
    pub notification_api: Arc<dyn NotificationApi>,
    pub notifier: Arc<dyn UserNotifier>,
    pub time: Arc<dyn TimeService>,
}

/// Everything one logged-in user needs: the shared connection and the surfaces built on it
#[derive(Clone)]
pub struct RealtimeSession {
    user_id: String,
    connection: ConnectionManager,
    dispatcher: MessageDispatcher,
    ports: SessionPorts,
}

impl RealtimeSession {
    pub fn new(
        user_id: impl Into<String>,
        connection: ConnectionManager,
        ports: SessionPorts,
        page_size: u32,
        echo_tolerance: Duration,
    ) -> RealtimeResult<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(RealtimeError::EmptyUserId);
        }
        let dispatcher = MessageDispatcher::new(
            user_id.clone(),
            connection.clone(),
            ports.message_api.clone(),
            ports.notifier.clone(),
            ports.time.clone(),
        )
        .with_page_size(page_size)
        .with_echo_tolerance(echo_tolerance);

        Ok(Self {
            user_id,
            connection,
            dispatcher,
            ports,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub async fn start(&self) {
        info!(user_id = %self.user_id, "Starting realtime session");
        self.connection.connect(&self.user_id).await;
    }

    /// Logout: close the connection and cancel any pending reconnect
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        info!(user_id = %self.user_id, "Realtime session stopped");
    }

    pub async fn state(&self) -> ConnectionState {
        self.connection.state().await
    }

    pub async fn open_chat_widget(&self) -> RealtimeResult<Arc<ChatWidget>> {
        ChatWidget::mount(
            self.dispatcher.clone(),
            self.ports.assignment_api.clone(),
            self.ports.notifier.clone(),
        )
        .await
    }

    pub async fn open_admin_inbox(&self) -> RealtimeResult<Arc<AdminInbox>> {
        AdminInbox::mount(
            self.dispatcher.clone(),
            self.ports.assignment_api.clone(),
            self.ports.notifier.clone(),
        )
        .await
    }

    pub async fn open_notification_bell(&self) -> RealtimeResult<Arc<NotificationBell>> {
        NotificationBell::mount(
            self.user_id.clone(),
            self.connection.clone(),
            self.ports.notification_api.clone(),
            self.ports.notifier.clone(),
        )
        .await
    }

    /// Server-side unread total, for surfaces mounted before the first push arrives
    pub async fn unread_count(&self) -> RealtimeResult<u64> {
        self.dispatcher.unread_count().await
    }
}
