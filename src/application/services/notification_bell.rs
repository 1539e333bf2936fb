use crate::{
    application::services::connection_manager::ConnectionManager,
    domain::entities::Notification,
    domain::errors::RealtimeResult,
    domain::ports::notification_api::NotificationApi,
    domain::ports::user_notifier::UserNotifier,
    domain::services::notification_feed::NotificationFeed,
    shared::events::{HandlerId, RealtimeHandler},
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_NOTIFICATION_PAGE_SIZE: u32 = 20;

/// Header bell: pushed notifications plus the listed history, with an unread badge
pub struct NotificationBell {
    user_id: String,
    connection: ConnectionManager,
    api: Arc<dyn NotificationApi>,
    notifier: Arc<dyn UserNotifier>,
    feed: Mutex<NotificationFeed>,
    page_size: u32,
    mounted: AtomicBool,
    handler_id: Mutex<Option<HandlerId>>,
}

impl NotificationBell {
    pub async fn mount(
        user_id: impl Into<String>,
        connection: ConnectionManager,
        api: Arc<dyn NotificationApi>,
        notifier: Arc<dyn UserNotifier>,
    ) -> RealtimeResult<Arc<Self>> {
        let bell = Arc::new(Self {
            user_id: user_id.into(),
            connection,
            api,
            notifier,
            feed: Mutex::new(NotificationFeed::new()),
            page_size: DEFAULT_NOTIFICATION_PAGE_SIZE,
            mounted: AtomicBool::new(true),
            handler_id: Mutex::new(None),
        });

        let id = bell.connection.register(bell.clone()).await;
        *bell.handler_id.lock().await = Some(id);

        // A failed first page is already reported to the user
        let _ = bell.load(0).await;
        info!(user_id = %bell.user_id, "Notification bell mounted");
        Ok(bell)
    }

    pub async fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
        if let Some(id) = self.handler_id.lock().await.take() {
            self.connection.unregister(id).await;
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Fetch a page and merge it into the feed. Returns how many were new.
    pub async fn load(&self, page: u32) -> RealtimeResult<usize> {
        let listed = match self
            .api
            .list_notifications(&self.user_id, page, self.page_size)
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                self.notifier
                    .error(&format!("Could not load notifications: {}", e));
                return Err(e);
            }
        };
        Ok(self.feed.lock().await.merge(listed))
    }

    pub async fn mark_read(&self, notification_id: &str) -> RealtimeResult<bool> {
        if let Err(e) = self.api.mark_notification_read(notification_id).await {
            self.notifier
                .error(&format!("Could not mark notification as read: {}", e));
            return Err(e);
        }
        Ok(self.feed.lock().await.mark_read(notification_id))
    }

    pub async fn mark_all_read(&self) -> RealtimeResult<usize> {
        if let Err(e) = self.api.mark_all_read(&self.user_id).await {
            self.notifier
                .error(&format!("Could not mark notifications as read: {}", e));
            return Err(e);
        }
        Ok(self.feed.lock().await.mark_all_read())
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.feed.lock().await.items().to_vec()
    }

    pub async fn unread_count(&self) -> usize {
        self.feed.lock().await.unread_count()
    }
}

#[async_trait]
impl RealtimeHandler for NotificationBell {
    async fn on_notification(&self, notification: &Notification) {
        if !self.is_mounted() {
            return;
        }
        let fresh = self.feed.lock().await.push(notification.clone());
        if fresh {
            self.notifier.info(&notification.title);
        } else {
            debug!(id = %notification.notification_id, "Notification already shown");
        }
    }
}
