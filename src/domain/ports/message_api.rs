use crate::domain::entities::{ChatMessage, SendMessageRequest};
use crate::domain::errors::RealtimeResult;

/// REST message service
#[async_trait::async_trait]
pub trait MessageApi: Send + Sync {
    /// One page of the conversation between `user_id` and `other_user_id`, newest first
    async fn get_conversation(
        &self,
        other_user_id: &str,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> RealtimeResult<Vec<ChatMessage>>;

    /// Fallback send path used when the realtime transport is unavailable
    async fn send_message(
        &self,
        request: &SendMessageRequest,
        user_id: &str,
    ) -> RealtimeResult<ChatMessage>;

    async fn get_unread_count(&self, user_id: &str) -> RealtimeResult<u64>;

    async fn mark_conversation_as_read(&self, other_user_id: &str, user_id: &str)
        -> RealtimeResult<()>;
}
