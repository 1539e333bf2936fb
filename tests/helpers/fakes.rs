use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use evcare_realtime::domain::ports::{
    AssignmentApi, MessageApi, NotificationApi, TimeService, UserNotifier,
};
use evcare_realtime::{
    Assignment, ChatMessage, MessageId, MessageStatus, Notification, NotificationType,
    RealtimeError, RealtimeEvent, RealtimeHandler, RealtimeResult, SendMessageRequest,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_767_261_600 + secs, 0).unwrap()
}

pub fn chat(id: &str, from: &str, to: &str, content: &str, sent_at: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        message_id: MessageId::parse(id),
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        content: content.to_string(),
        image_url: None,
        status: MessageStatus::Sent,
        sent_at,
        delivered_at: None,
        read_at: None,
        client_message_id: None,
    }
}

pub fn notification(id: &str, title: &str, sent_at: DateTime<Utc>) -> Notification {
    Notification {
        notification_id: id.to_string(),
        title: title.to_string(),
        content: format!("{} details", title),
        notification_type: NotificationType::Appointment,
        is_read: false,
        sent_at,
    }
}

pub fn assignment(id: &str, customer_id: &str, staff_id: &str) -> Assignment {
    Assignment {
        assignment_id: id.to_string(),
        customer_id: customer_id.to_string(),
        staff_id: staff_id.to_string(),
        assigned_at: None,
        active: true,
    }
}

/// Clock frozen at a settable instant; timers follow tokio's clock
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

#[async_trait]
impl TimeService for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// In-memory message service
#[derive(Default)]
pub struct FakeMessageApi {
    pub stored: Mutex<Vec<ChatMessage>>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub marked_read: Mutex<Vec<(String, String)>>,
    pub fail_send: AtomicBool,
    pub fail_history: AtomicBool,
    pub history_calls: AtomicUsize,
    pub unread: AtomicU64,
    next_id: AtomicU64,
}

impl FakeMessageApi {
    pub fn with_history(messages: Vec<ChatMessage>) -> Self {
        let api = Self::default();
        *api.stored.lock().unwrap() = messages;
        api
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageApi for FakeMessageApi {
    async fn get_conversation(
        &self,
        other_user_id: &str,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> RealtimeResult<Vec<ChatMessage>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(RealtimeError::Http("Connection failed: history".to_string()));
        }
        let mut matching: Vec<ChatMessage> = self
            .stored
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.involves(user_id, other_user_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(matching
            .into_iter()
            .skip((page * page_size) as usize)
            .take(page_size as usize)
            .collect())
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
        _user_id: &str,
    ) -> RealtimeResult<ChatMessage> {
        self.sent.lock().unwrap().push(request.clone());
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(RealtimeError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut saved = chat(
            &format!("rest-{}", id),
            &request.sender_id,
            &request.receiver_id,
            &request.content,
            at(3600),
        );
        saved.image_url = request.image_url.clone();
        self.stored.lock().unwrap().push(saved.clone());
        Ok(saved)
    }

    async fn get_unread_count(&self, _user_id: &str) -> RealtimeResult<u64> {
        Ok(self.unread.load(Ordering::SeqCst))
    }

    async fn mark_conversation_as_read(
        &self,
        other_user_id: &str,
        user_id: &str,
    ) -> RealtimeResult<()> {
        self.marked_read
            .lock()
            .unwrap()
            .push((user_id.to_string(), other_user_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAssignmentApi {
    pub current: Mutex<Option<Assignment>>,
    pub by_staff: Mutex<Vec<Assignment>>,
}

impl FakeAssignmentApi {
    pub fn customer_of(customer_id: &str, staff_id: &str) -> Self {
        let api = Self::default();
        *api.current.lock().unwrap() = Some(assignment("a-1", customer_id, staff_id));
        api
    }

    pub fn staff_with(staff_id: &str, customers: &[&str]) -> Self {
        let api = Self::default();
        *api.by_staff.lock().unwrap() = customers
            .iter()
            .enumerate()
            .map(|(i, c)| assignment(&format!("a-{}", i), c, staff_id))
            .collect();
        api
    }
}

#[async_trait]
impl AssignmentApi for FakeAssignmentApi {
    async fn current_assignment(&self, _user_id: &str) -> RealtimeResult<Option<Assignment>> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn list_assignments_for_staff(&self, staff_id: &str) -> RealtimeResult<Vec<Assignment>> {
        Ok(self
            .by_staff
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.staff_id == staff_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeNotificationApi {
    pub items: Mutex<Vec<Notification>>,
    pub read_calls: Mutex<Vec<String>>,
    pub read_all_calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl NotificationApi for FakeNotificationApi {
    async fn list_notifications(
        &self,
        _user_id: &str,
        page: u32,
        page_size: u32,
    ) -> RealtimeResult<Vec<Notification>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RealtimeError::Http("Connection failed".to_string()));
        }
        let mut items = self.items.lock().unwrap().clone();
        items.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(items
            .into_iter()
            .skip((page * page_size) as usize)
            .take(page_size as usize)
            .collect())
    }

    async fn mark_notification_read(&self, notification_id: &str) -> RealtimeResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RealtimeError::Http("Connection failed".to_string()));
        }
        self.read_calls
            .lock()
            .unwrap()
            .push(notification_id.to_string());
        Ok(())
    }

    async fn mark_all_read(&self, _user_id: &str) -> RealtimeResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RealtimeError::Http("Connection failed".to_string()));
        }
        self.read_all_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Captures toasts instead of showing them
#[derive(Default)]
pub struct RecordingNotifier {
    pub errors: Mutex<Vec<String>>,
    pub infos: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl UserNotifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }
}

/// Handler that records every callback it receives
#[derive(Default)]
pub struct RecordingHandler {
    pub events: Mutex<Vec<RealtimeEvent>>,
}

impl RecordingHandler {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn errors(&self) -> Vec<RealtimeError> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RealtimeEvent::Error(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RealtimeHandler for RecordingHandler {
    async fn on_message(&self, message: &ChatMessage) {
        self.events
            .lock()
            .unwrap()
            .push(RealtimeEvent::Message(message.clone()));
    }

    async fn on_notification(&self, notification: &Notification) {
        self.events
            .lock()
            .unwrap()
            .push(RealtimeEvent::Notification(notification.clone()));
    }

    async fn on_unread_count(&self, count: u64) {
        self.events
            .lock()
            .unwrap()
            .push(RealtimeEvent::UnreadCount(count));
    }

    async fn on_connected(&self, user_id: &str) {
        self.events.lock().unwrap().push(RealtimeEvent::Connected {
            user_id: user_id.to_string(),
        });
    }

    async fn on_disconnected(&self, user_id: &str) {
        self.events.lock().unwrap().push(RealtimeEvent::Disconnected {
            user_id: user_id.to_string(),
        });
    }

    async fn on_error(&self, error: &RealtimeError) {
        self.events
            .lock()
            .unwrap()
            .push(RealtimeEvent::Error(error.clone()));
    }
}
