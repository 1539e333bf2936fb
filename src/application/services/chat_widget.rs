//! Customer-facing chat widget: one conversation with the assigned staff member.

use crate::{
    application::services::message_dispatcher::MessageDispatcher,
    domain::entities::{ChatMessage, MessageId},
    domain::errors::{RealtimeError, RealtimeResult},
    domain::ports::assignment_api::AssignmentApi,
    domain::ports::user_notifier::UserNotifier,
    domain::services::reconciliation::{Conversation, ReconcileOutcome},
    shared::events::{HandlerId, RealtimeHandler},
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// How many foreign message ids the widget remembers for redelivery checks
const SEEN_ELSEWHERE_CAPACITY: usize = 64;

/// What the widget chrome displays besides the message list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetView {
    pub open: bool,
    /// Incoming messages in this conversation since the widget was last opened
    pub unread: u64,
    /// Incoming messages for the user that belong to some other conversation
    pub unread_elsewhere: u64,
    /// Last total pushed on the unread-count queue
    pub server_unread: Option<u64>,
    pub connected: bool,
    pub last_error: Option<String>,
}

pub struct ChatWidget {
    dispatcher: MessageDispatcher,
    assignments: Arc<dyn AssignmentApi>,
    notifier: Arc<dyn UserNotifier>,
    conversation: Mutex<Conversation>,
    view: Mutex<WidgetView>,
    seen_elsewhere: Mutex<VecDeque<MessageId>>,
    mounted: AtomicBool,
    handler_id: Mutex<Option<HandlerId>>,
}

impl ChatWidget {
    /// Resolve the counterpart, register for events and load the first page of history
    pub async fn mount(
        dispatcher: MessageDispatcher,
        assignments: Arc<dyn AssignmentApi>,
        notifier: Arc<dyn UserNotifier>,
    ) -> RealtimeResult<Arc<Self>> {
        let counterpart_id = resolve_counterpart(&dispatcher, assignments.as_ref(), notifier.as_ref()).await?;
        let connected = dispatcher.connection().is_connected().await;

        let widget = Arc::new(Self {
            conversation: Mutex::new(dispatcher.new_conversation(counterpart_id.clone())),
            dispatcher,
            assignments,
            notifier,
            view: Mutex::new(WidgetView {
                connected,
                ..WidgetView::default()
            }),
            seen_elsewhere: Mutex::new(VecDeque::new()),
            mounted: AtomicBool::new(true),
            handler_id: Mutex::new(None),
        });

        let id = widget
            .dispatcher
            .connection()
            .register(widget.clone())
            .await;
        *widget.handler_id.lock().await = Some(id);
        info!(counterpart_id = %counterpart_id, "Chat widget mounted");

        // A failed first page is already reported to the user
        let _ = widget.load_history(0).await;
        Ok(widget)
    }

    /// Stop receiving events. Safe to call more than once.
    pub async fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
        if let Some(id) = self.handler_id.lock().await.take() {
            self.dispatcher.connection().unregister(id).await;
            debug!("Chat widget unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub async fn counterpart_id(&self) -> String {
        self.conversation.lock().await.counterpart_id().to_string()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.lock().await.messages().to_vec()
    }

    pub async fn view(&self) -> WidgetView {
        self.view.lock().await.clone()
    }

    /// Open the panel: the local counter resets and the conversation is marked read
    pub async fn open(&self) -> RealtimeResult<()> {
        {
            let mut view = self.view.lock().await;
            view.open = true;
            view.unread = 0;
        }
        self.dispatcher.mark_read(&self.conversation).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.view.lock().await.open = false;
    }

    pub async fn send(&self, content: &str, image_url: Option<String>) -> RealtimeResult<ChatMessage> {
        self.dispatcher
            .send(&self.conversation, content, image_url)
            .await
    }

    pub async fn load_history(&self, page: u32) -> RealtimeResult<usize> {
        self.dispatcher
            .load_history(&self.conversation, page)
            .await
    }

    /// Re-read the assignment; a new counterpart starts a fresh conversation.
    /// Returns whether the counterpart changed.
    pub async fn refresh_counterpart(&self) -> RealtimeResult<bool> {
        let counterpart_id =
            resolve_counterpart(&self.dispatcher, self.assignments.as_ref(), self.notifier.as_ref())
                .await?;
        {
            let mut conversation = self.conversation.lock().await;
            if conversation.counterpart_id() == counterpart_id {
                return Ok(false);
            }
            info!(
                from = %conversation.counterpart_id(),
                to = %counterpart_id,
                "Assignment changed, switching conversation"
            );
            *conversation = self.dispatcher.new_conversation(counterpart_id);
        }
        self.view.lock().await.unread = 0;
        let _ = self.load_history(0).await;
        Ok(true)
    }

    /// Record a message id seen outside this conversation; false if it was already counted
    async fn first_sighting_elsewhere(&self, id: &MessageId) -> bool {
        let mut seen = self.seen_elsewhere.lock().await;
        if seen.contains(id) {
            return false;
        }
        if seen.len() == SEEN_ELSEWHERE_CAPACITY {
            seen.pop_front();
        }
        seen.push_back(id.clone());
        true
    }
}

async fn resolve_counterpart(
    dispatcher: &MessageDispatcher,
    assignments: &dyn AssignmentApi,
    notifier: &dyn UserNotifier,
) -> RealtimeResult<String> {
    let user_id = dispatcher.user_id();
    let assignment = match assignments.current_assignment(user_id).await {
        Ok(assignment) => assignment,
        Err(e) => {
            notifier.error(&format!("Could not load your support assignment: {}", e));
            return Err(e);
        }
    };
    match assignment.as_ref().and_then(|a| a.counterpart_of(user_id)) {
        Some(counterpart_id) => Ok(counterpart_id.to_string()),
        None => {
            notifier.info("No support staff has been assigned to you yet");
            Err(RealtimeError::NotFound(format!(
                "active assignment for user {}",
                user_id
            )))
        }
    }
}

#[async_trait]
impl RealtimeHandler for ChatWidget {
    async fn on_message(&self, message: &ChatMessage) {
        if !self.is_mounted() {
            return;
        }
        let user_id = self.dispatcher.user_id();

        let outcome = {
            let mut conversation = self.conversation.lock().await;
            if !conversation.involves(message) {
                None
            } else {
                Some(conversation.reconcile(message.clone()))
            }
        };

        match outcome {
            Some(ReconcileOutcome::Appended { .. }) if message.sender_id != user_id => {
                let open = {
                    let mut view = self.view.lock().await;
                    if !view.open {
                        view.unread += 1;
                    }
                    view.open
                };
                if open {
                    self.dispatcher.acknowledge(&self.conversation).await;
                }
            }
            Some(outcome) => debug!(?outcome, "Widget reconciled message"),
            None if message.receiver_id == user_id => {
                if self.first_sighting_elsewhere(&message.message_id).await {
                    self.view.lock().await.unread_elsewhere += 1;
                } else {
                    debug!(id = %message.message_id, "Foreign message already counted");
                }
            }
            None => {}
        }
    }

    async fn on_unread_count(&self, count: u64) {
        if self.is_mounted() {
            self.view.lock().await.server_unread = Some(count);
        }
    }

    async fn on_connected(&self, _user_id: &str) {
        if self.is_mounted() {
            let mut view = self.view.lock().await;
            view.connected = true;
            view.last_error = None;
        }
    }

    async fn on_disconnected(&self, _user_id: &str) {
        if self.is_mounted() {
            self.view.lock().await.connected = false;
        }
    }

    async fn on_error(&self, error: &RealtimeError) {
        if self.is_mounted() {
            self.view.lock().await.last_error = Some(error.to_string());
        }
    }
}
