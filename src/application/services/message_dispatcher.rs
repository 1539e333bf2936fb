use crate::{
    application::services::connection_manager::ConnectionManager,
    domain::entities::{ChatMessage, MarkReadRequest, SendMessageRequest},
    domain::errors::{RealtimeError, RealtimeResult},
    domain::ports::message_api::MessageApi,
    domain::ports::time_service::TimeService,
    domain::ports::user_notifier::UserNotifier,
    domain::services::reconciliation::{Conversation, DEFAULT_ECHO_TOLERANCE},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Send, history and read-receipt paths shared by every surface.
///
/// The realtime transport is tried first; the REST service is the fallback. REST-level failures
/// are reported through the [`UserNotifier`] as well as returned.
#[derive(Clone)]
pub struct MessageDispatcher {
    user_id: String,
    connection: ConnectionManager,
    message_api: Arc<dyn MessageApi>,
    notifier: Arc<dyn UserNotifier>,
    time: Arc<dyn TimeService>,
    page_size: u32,
    echo_tolerance: Duration,
}

impl MessageDispatcher {
    pub fn new(
        user_id: impl Into<String>,
        connection: ConnectionManager,
        message_api: Arc<dyn MessageApi>,
        notifier: Arc<dyn UserNotifier>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            connection,
            message_api,
            notifier,
            time,
            page_size: DEFAULT_PAGE_SIZE,
            echo_tolerance: DEFAULT_ECHO_TOLERANCE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_echo_tolerance(mut self, tolerance: Duration) -> Self {
        self.echo_tolerance = tolerance;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Empty conversation with `counterpart_id`, configured like every other one
    pub fn new_conversation(&self, counterpart_id: impl Into<String>) -> Conversation {
        Conversation::new(self.user_id.clone(), counterpart_id).with_echo_tolerance(self.echo_tolerance)
    }

    /// Show the message immediately, then deliver it.
    ///
    /// Returns the optimistic placeholder when the transport took it (the echo promotes it
    /// later), or the stored message when the REST fallback answered. If both paths fail the
    /// placeholder is removed again.
    pub async fn send(
        &self,
        conversation: &Mutex<Conversation>,
        content: &str,
        image_url: Option<String>,
    ) -> RealtimeResult<ChatMessage> {
        if let Err(reason) = ChatMessage::validate_content(content, image_url.as_deref()) {
            self.notifier.error(&reason);
            return Err(RealtimeError::Validation(reason));
        }

        let optimistic = conversation
            .lock()
            .await
            .append_optimistic(content, image_url, self.time.now());
        let request = SendMessageRequest::from_optimistic(&optimistic);

        match self.connection.send(&request).await {
            Ok(()) => {
                debug!(temp_id = %optimistic.message_id, "Message handed to realtime transport");
                return Ok(optimistic);
            }
            Err(e) => warn!("Realtime send unavailable ({}), falling back to REST", e),
        }

        match self.message_api.send_message(&request, &self.user_id).await {
            Ok(saved) => {
                let outcome = conversation
                    .lock()
                    .await
                    .confirm(&optimistic.message_id, saved.clone());
                info!(message_id = %saved.message_id, ?outcome, "Message sent via REST");
                Ok(saved)
            }
            Err(e) => {
                conversation
                    .lock()
                    .await
                    .remove_temporary(&optimistic.message_id);
                self.notifier
                    .error(&format!("Message could not be sent: {}", e));
                Err(e)
            }
        }
    }

    /// Fetch one page of history and merge it. Returns how many messages were new.
    pub async fn load_history(
        &self,
        conversation: &Mutex<Conversation>,
        page: u32,
    ) -> RealtimeResult<usize> {
        let counterpart_id = conversation.lock().await.counterpart_id().to_string();

        let mut batch = match self
            .message_api
            .get_conversation(&counterpart_id, &self.user_id, page, self.page_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                self.notifier
                    .error(&format!("Could not load messages: {}", e));
                return Err(e);
            }
        };
        // Pages arrive newest first
        batch.reverse();

        let added = conversation.lock().await.merge_history(batch);
        debug!(counterpart_id = %counterpart_id, page, added, "History merged");
        Ok(added)
    }

    /// Tell the server everything from the counterpart has been read, then reflect it locally
    pub async fn mark_read(&self, conversation: &Mutex<Conversation>) -> RealtimeResult<usize> {
        let counterpart_id = conversation.lock().await.counterpart_id().to_string();
        let request = MarkReadRequest {
            user_id: self.user_id.clone(),
            other_user_id: counterpart_id.clone(),
        };

        if let Err(e) = self.connection.mark_read(&request).await {
            debug!("Realtime read receipt unavailable ({}), using REST", e);
            if let Err(e) = self
                .message_api
                .mark_conversation_as_read(&counterpart_id, &self.user_id)
                .await
            {
                self.notifier
                    .error(&format!("Could not mark conversation as read: {}", e));
                return Err(e);
            }
        }

        Ok(conversation
            .lock()
            .await
            .mark_incoming_read(self.time.now()))
    }

    /// Read receipt over the transport only, for use inside event callbacks.
    /// Without a connection nothing is sent and the local view is left alone.
    pub async fn acknowledge(&self, conversation: &Mutex<Conversation>) -> usize {
        let mut conversation = conversation.lock().await;
        let request = MarkReadRequest {
            user_id: self.user_id.clone(),
            other_user_id: conversation.counterpart_id().to_string(),
        };
        match self.connection.mark_read(&request).await {
            Ok(()) => conversation.mark_incoming_read(self.time.now()),
            Err(_) => 0,
        }
    }

    /// Server-side unread total for the user
    pub async fn unread_count(&self) -> RealtimeResult<u64> {
        self.message_api.get_unread_count(&self.user_id).await
    }
}
