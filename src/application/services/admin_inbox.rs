//! Staff inbox: one conversation per assigned customer, one of them selected at a time.

use crate::{
    application::services::message_dispatcher::MessageDispatcher,
    domain::entities::ChatMessage,
    domain::errors::{RealtimeError, RealtimeResult},
    domain::ports::assignment_api::AssignmentApi,
    domain::ports::user_notifier::UserNotifier,
    domain::services::reconciliation::{Conversation, ReconcileOutcome},
    shared::events::{HandlerId, RealtimeHandler},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One row of the conversation list
#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    pub counterpart_id: String,
    pub last_message: Option<ChatMessage>,
    pub unread: u64,
}

#[derive(Default)]
struct InboxState {
    conversations: HashMap<String, Arc<Mutex<Conversation>>>,
    unread: HashMap<String, u64>,
    selected: Option<String>,
    server_unread: Option<u64>,
    connected: bool,
}

pub struct AdminInbox {
    dispatcher: MessageDispatcher,
    assignments: Arc<dyn AssignmentApi>,
    notifier: Arc<dyn UserNotifier>,
    state: Mutex<InboxState>,
    mounted: AtomicBool,
    handler_id: Mutex<Option<HandlerId>>,
}

impl AdminInbox {
    /// Seed conversations from the staff member's assignments and register for events
    pub async fn mount(
        dispatcher: MessageDispatcher,
        assignments: Arc<dyn AssignmentApi>,
        notifier: Arc<dyn UserNotifier>,
    ) -> RealtimeResult<Arc<Self>> {
        let connected = dispatcher.connection().is_connected().await;
        let inbox = Arc::new(Self {
            dispatcher,
            assignments,
            notifier,
            state: Mutex::new(InboxState {
                connected,
                ..InboxState::default()
            }),
            mounted: AtomicBool::new(true),
            handler_id: Mutex::new(None),
        });

        let id = inbox.dispatcher.connection().register(inbox.clone()).await;
        *inbox.handler_id.lock().await = Some(id);

        let seeded = match inbox.refresh_assignments().await {
            Ok(seeded) => seeded,
            Err(e) => {
                inbox.unmount().await;
                return Err(e);
            }
        };
        info!(conversations = seeded, "Admin inbox mounted");
        Ok(inbox)
    }

    pub async fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
        if let Some(id) = self.handler_id.lock().await.take() {
            self.dispatcher.connection().unregister(id).await;
            debug!("Admin inbox unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Add a conversation for every active assignment not shown yet. Returns how many were added.
    pub async fn refresh_assignments(&self) -> RealtimeResult<usize> {
        let staff_id = self.dispatcher.user_id();
        let assignments = match self.assignments.list_assignments_for_staff(staff_id).await {
            Ok(assignments) => assignments,
            Err(e) => {
                self.notifier
                    .error(&format!("Could not load assigned customers: {}", e));
                return Err(e);
            }
        };

        let mut state = self.state.lock().await;
        let mut added = 0;
        for assignment in assignments.iter().filter(|a| a.active) {
            if let Some(customer_id) = assignment.counterpart_of(staff_id) {
                if !state.conversations.contains_key(customer_id) {
                    self.insert_conversation(&mut state, customer_id);
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    fn insert_conversation(&self, state: &mut InboxState, counterpart_id: &str) -> Arc<Mutex<Conversation>> {
        state
            .conversations
            .entry(counterpart_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(self.dispatcher.new_conversation(counterpart_id))))
            .clone()
    }

    async fn conversation(&self, counterpart_id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.state.lock().await.conversations.get(counterpart_id).cloned()
    }

    /// Make `counterpart_id` the visible conversation: load its history and mark it read
    pub async fn select(&self, counterpart_id: &str) -> RealtimeResult<()> {
        let conversation = {
            let mut state = self.state.lock().await;
            state.selected = Some(counterpart_id.to_string());
            state.unread.insert(counterpart_id.to_string(), 0);
            self.insert_conversation(&mut state, counterpart_id)
        };
        self.dispatcher.load_history(&conversation, 0).await?;
        self.dispatcher.mark_read(&conversation).await?;
        Ok(())
    }

    pub async fn selected(&self) -> Option<String> {
        self.state.lock().await.selected.clone()
    }

    /// Send to the selected conversation
    pub async fn send(&self, content: &str, image_url: Option<String>) -> RealtimeResult<ChatMessage> {
        let conversation = {
            let state = self.state.lock().await;
            state
                .selected
                .as_ref()
                .and_then(|id| state.conversations.get(id).cloned())
        };
        match conversation {
            Some(conversation) => self.dispatcher.send(&conversation, content, image_url).await,
            None => {
                self.notifier.error("Select a conversation first");
                Err(RealtimeError::Validation(
                    "no conversation selected".to_string(),
                ))
            }
        }
    }

    /// Load an older page of the selected conversation
    pub async fn load_more(&self, page: u32) -> RealtimeResult<usize> {
        let Some(selected) = self.selected().await else {
            return Ok(0);
        };
        match self.conversation(&selected).await {
            Some(conversation) => self.dispatcher.load_history(&conversation, page).await,
            None => Ok(0),
        }
    }

    pub async fn messages(&self, counterpart_id: &str) -> Vec<ChatMessage> {
        match self.conversation(counterpart_id).await {
            Some(conversation) => conversation.lock().await.messages().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn unread_for(&self, counterpart_id: &str) -> u64 {
        self.state
            .lock()
            .await
            .unread
            .get(counterpart_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn server_unread(&self) -> Option<u64> {
        self.state.lock().await.server_unread
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Conversations ordered by latest activity, empty ones last
    pub async fn conversation_list(&self) -> Vec<InboxEntry> {
        let (conversations, unread) = {
            let state = self.state.lock().await;
            (state.conversations.clone(), state.unread.clone())
        };

        let mut entries = Vec::with_capacity(conversations.len());
        for (counterpart_id, conversation) in conversations {
            let last_message = conversation.lock().await.latest().cloned();
            entries.push(InboxEntry {
                unread: unread.get(&counterpart_id).copied().unwrap_or(0),
                counterpart_id,
                last_message,
            });
        }
        entries.sort_by(|a, b| {
            let a_at = a.last_message.as_ref().map(|m| m.sent_at);
            let b_at = b.last_message.as_ref().map(|m| m.sent_at);
            b_at.cmp(&a_at)
                .then_with(|| a.counterpart_id.cmp(&b.counterpart_id))
        });
        entries
    }
}

#[async_trait]
impl RealtimeHandler for AdminInbox {
    async fn on_message(&self, message: &ChatMessage) {
        if !self.is_mounted() {
            return;
        }
        let staff_id = self.dispatcher.user_id();
        let Some(counterpart_id) = message.counterpart_of(staff_id) else {
            return;
        };

        // A customer writing before the assignment list refreshed still gets a row
        let (conversation, selected) = {
            let mut state = self.state.lock().await;
            let conversation = self.insert_conversation(&mut state, counterpart_id);
            (conversation, state.selected.as_deref() == Some(counterpart_id))
        };

        let outcome = conversation.lock().await.reconcile(message.clone());
        match outcome {
            ReconcileOutcome::Appended { .. } if message.sender_id != staff_id => {
                if selected {
                    self.dispatcher.acknowledge(&conversation).await;
                } else {
                    let mut state = self.state.lock().await;
                    *state.unread.entry(counterpart_id.to_string()).or_insert(0) += 1;
                }
            }
            outcome => debug!(?outcome, counterpart_id, "Inbox reconciled message"),
        }
    }

    async fn on_unread_count(&self, count: u64) {
        if self.is_mounted() {
            self.state.lock().await.server_unread = Some(count);
        }
    }

    async fn on_connected(&self, _user_id: &str) {
        if self.is_mounted() {
            self.state.lock().await.connected = true;
        }
    }

    async fn on_disconnected(&self, _user_id: &str) {
        if self.is_mounted() {
            self.state.lock().await.connected = false;
        }
    }
}
