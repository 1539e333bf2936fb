use crate::domain::entities::Notification;
use crate::domain::errors::RealtimeResult;

/// REST notification service
#[async_trait::async_trait]
pub trait NotificationApi: Send + Sync {
    /// List notifications for a user with pagination, newest first
    async fn list_notifications(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> RealtimeResult<Vec<Notification>>;

    async fn mark_notification_read(&self, notification_id: &str) -> RealtimeResult<()>;

    async fn mark_all_read(&self, user_id: &str) -> RealtimeResult<()>;
}
