use crate::application::services::{ConnectionManager, RealtimeSession, SessionPorts};
use crate::config::Config;
use crate::domain::errors::RealtimeResult;
use crate::domain::ports::assignment_api::AssignmentApi;
use crate::domain::ports::message_api::MessageApi;
use crate::domain::ports::notification_api::NotificationApi;
use crate::domain::ports::time_service::TimeService;
use crate::domain::ports::transport::Transport;
use crate::domain::ports::user_notifier::UserNotifier;
use crate::infrastructure::http::RestClient;
use crate::infrastructure::providers::TracingNotifier;
use crate::infrastructure::runtime::TokioTimeService;
use crate::infrastructure::transport::WebSocketTransport;
use std::sync::Arc;

/// Wire the production adapters into a session for `user_id`
pub fn build_session(config: &Config, user_id: &str) -> RealtimeResult<RealtimeSession> {
    let rest = Arc::new(RestClient::new(
        &config.api_base_url,
        config.auth_token.clone(),
        config.http_timeout(),
    )?);
    tracing::info!("REST client initialized for {}", config.api_base_url);

    let time = Arc::new(TokioTimeService::new()) as Arc<dyn TimeService>;
    let transport = Arc::new(WebSocketTransport::new()) as Arc<dyn Transport>;

    let settings = config.connection_settings();
    tracing::info!(
        "Connection manager initialized (reconnect every {:?}, at most {} attempts)",
        settings.reconnect_delay,
        settings.max_reconnect_attempts
    );
    let connection = ConnectionManager::new(settings, transport, time.clone());

    let ports = SessionPorts {
        message_api: rest.clone() as Arc<dyn MessageApi>,
        assignment_api: rest.clone() as Arc<dyn AssignmentApi>,
        notification_api: rest as Arc<dyn NotificationApi>,
        notifier: Arc::new(TracingNotifier::new()) as Arc<dyn UserNotifier>,
        time,
    };

    RealtimeSession::new(
        user_id,
        connection,
        ports,
        config.history_page_size,
        config.echo_tolerance(),
    )
}
