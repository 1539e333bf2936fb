//! Reconciliation of a two-party conversation.
//!
//! Optimistic local sends, server echoes of those sends, live inbound messages and pages of
//! history all land in one [`Conversation`]. The view stays duplicate-free and ordered by
//! `sent_at` (stable on ties) whatever order those inputs arrive in.

use crate::domain::entities::{ChatMessage, MessageId, MessageStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Window within which an echo of our own send is matched to its placeholder
pub const DEFAULT_ECHO_TOLERANCE: Duration = Duration::from_secs(5);

/// What [`Conversation::reconcile`] did with an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Not part of this conversation
    Ignored,
    /// Identical to the previous event, short-circuited
    Redelivered,
    /// Identity already displayed; only status fields may have advanced
    Duplicate,
    /// Echo of our own placeholder, which now carries the server identity
    Promoted { index: usize },
    /// Our own message with no placeholder left to promote
    EchoDropped,
    /// New message inserted
    Appended { index: usize },
}

impl ReconcileOutcome {
    /// Whether the visible list changed shape (insert or replace)
    pub fn changed(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Promoted { .. } | ReconcileOutcome::Appended { .. }
        )
    }
}

/// The in-memory view of the conversation between `self_id` and `counterpart_id`
#[derive(Debug, Clone)]
pub struct Conversation {
    self_id: String,
    counterpart_id: String,
    messages: Vec<ChatMessage>,
    last_processed: Option<MessageId>,
    echo_tolerance: Duration,
}

impl Conversation {
    pub fn new(self_id: impl Into<String>, counterpart_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            counterpart_id: counterpart_id.into(),
            messages: Vec::new(),
            last_processed: None,
            echo_tolerance: DEFAULT_ECHO_TOLERANCE,
        }
    }

    pub fn with_echo_tolerance(mut self, tolerance: Duration) -> Self {
        self.echo_tolerance = tolerance;
        self
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn counterpart_id(&self) -> &str {
        &self.counterpart_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn latest(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Whether `message` belongs to this pair of participants
    pub fn involves(&self, message: &ChatMessage) -> bool {
        message.involves(&self.self_id, &self.counterpart_id)
    }

    /// Placeholders still waiting for their echo
    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_temporary()).count()
    }

    /// Counterpart messages we have not marked read yet
    pub fn unread_incoming(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender_id == self.counterpart_id && m.status != MessageStatus::Read)
            .count()
    }

    pub fn position_of(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.message_id == id)
    }

    /// Insert a placeholder for a message the user just submitted.
    ///
    /// The placeholder goes at the tail; its `sent_at` is clamped so the tail never goes
    /// backwards in time when the server clock runs ahead of ours.
    pub fn append_optimistic(
        &mut self,
        content: impl Into<String>,
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> ChatMessage {
        let sent_at = match self.messages.last() {
            Some(tail) if tail.sent_at > now => tail.sent_at,
            _ => now,
        };

        let millis = now.timestamp_millis();
        let mut seq = 0;
        let mut message_id = MessageId::temporary(millis, seq);
        while self.position_of(&message_id).is_some() {
            seq += 1;
            message_id = MessageId::temporary(millis, seq);
        }

        let message = ChatMessage {
            message_id,
            sender_id: self.self_id.clone(),
            receiver_id: self.counterpart_id.clone(),
            content: content.into(),
            image_url,
            status: MessageStatus::Sent,
            sent_at,
            delivered_at: None,
            read_at: None,
            client_message_id: Some(Uuid::new_v4().to_string()),
        };
        self.messages.push(message.clone());
        message
    }

    /// Merge one inbound message event
    pub fn reconcile(&mut self, incoming: ChatMessage) -> ReconcileOutcome {
        if !self.involves(&incoming) {
            return ReconcileOutcome::Ignored;
        }
        if self.last_processed.as_ref() == Some(&incoming.message_id) {
            return ReconcileOutcome::Redelivered;
        }
        self.last_processed = Some(incoming.message_id.clone());

        if let Some(index) = self.position_of(&incoming.message_id) {
            self.advance_status(index, &incoming);
            return ReconcileOutcome::Duplicate;
        }

        if incoming.sender_id == self.self_id {
            return match self.echo_target(&incoming) {
                Some(index) => ReconcileOutcome::Promoted {
                    index: self.replace_at(index, incoming),
                },
                None => ReconcileOutcome::EchoDropped,
            };
        }

        ReconcileOutcome::Appended {
            index: self.insert_ordered(incoming),
        }
    }

    /// Merge a chronological page of history. Returns how many entries were new.
    ///
    /// Entries already present are refreshed from the server copy; own messages also
    /// promote a matching placeholder. Merging the same page twice is a no-op.
    pub fn merge_history(&mut self, page: Vec<ChatMessage>) -> usize {
        let mut added = 0;
        for message in page {
            if !self.involves(&message) {
                continue;
            }
            if let Some(index) = self.position_of(&message.message_id) {
                self.messages[index] = message;
                continue;
            }
            if message.sender_id == self.self_id {
                if let Some(index) = self.echo_target(&message) {
                    self.messages[index] = message;
                    continue;
                }
            }
            self.messages.push(message);
            added += 1;
        }
        self.messages.sort_by_key(|m| m.sent_at);
        added
    }

    /// Drop a placeholder after its send failed for good
    pub fn remove_temporary(&mut self, id: &MessageId) -> Option<ChatMessage> {
        if !id.is_temporary() {
            return None;
        }
        self.remove(id)
    }

    /// The server acknowledged placeholder `temp_id` directly (REST send) with `confirmed`
    pub fn confirm(&mut self, temp_id: &MessageId, confirmed: ChatMessage) -> ReconcileOutcome {
        if self.position_of(&confirmed.message_id).is_some() {
            // The echo beat the acknowledgement
            self.remove_temporary(temp_id);
            return ReconcileOutcome::Duplicate;
        }
        match self.position_of(temp_id) {
            Some(index) => ReconcileOutcome::Promoted {
                index: self.replace_at(index, confirmed),
            },
            None => ReconcileOutcome::Appended {
                index: self.insert_ordered(confirmed),
            },
        }
    }

    /// Explicit delete
    pub fn remove(&mut self, id: &MessageId) -> Option<ChatMessage> {
        let index = self.position_of(id)?;
        Some(self.messages.remove(index))
    }

    /// Mark everything the counterpart sent as read. Returns how many changed.
    pub fn mark_incoming_read(&mut self, at: DateTime<Utc>) -> usize {
        let counterpart = self.counterpart_id.clone();
        self.mark_read_where(at, |m| m.sender_id == counterpart)
    }

    /// The counterpart read everything we sent
    pub fn mark_outgoing_read(&mut self, at: DateTime<Utc>) -> usize {
        let me = self.self_id.clone();
        self.mark_read_where(at, |m| m.sender_id == me && !m.is_temporary())
    }

    /// Whether `sent_at` is non-decreasing along the list
    pub fn is_ordered(&self) -> bool {
        self.messages.windows(2).all(|w| w[0].sent_at <= w[1].sent_at)
    }

    fn mark_read_where<F>(&mut self, at: DateTime<Utc>, pred: F) -> usize
    where
        F: Fn(&ChatMessage) -> bool,
    {
        let mut changed = 0;
        for message in self.messages.iter_mut().filter(|m| pred(m)) {
            if message.status != MessageStatus::Read {
                message.status = MessageStatus::Read;
                message.read_at = Some(at);
                changed += 1;
            }
        }
        changed
    }

    /// Placeholder an echo of our own send should replace.
    ///
    /// An exact correlation token wins; otherwise the oldest placeholder with the same payload
    /// within the tolerance window (FIFO, so rapid identical sends pair up in order).
    fn echo_target(&self, incoming: &ChatMessage) -> Option<usize> {
        if let Some(token) = incoming.client_message_id.as_deref() {
            let exact = self.messages.iter().position(|m| {
                m.is_temporary() && m.client_message_id.as_deref() == Some(token)
            });
            if exact.is_some() {
                return exact;
            }
        }

        let tolerance_ms = self.echo_tolerance.as_millis() as i64;
        self.messages.iter().position(|m| {
            m.is_temporary()
                && m.same_payload(incoming)
                && (m.sent_at - incoming.sent_at).num_milliseconds().abs() <= tolerance_ms
        })
    }

    /// Replace in place; re-sort only if the new timestamp breaks ordering
    fn replace_at(&mut self, index: usize, message: ChatMessage) -> usize {
        let id = message.message_id.clone();
        self.messages[index] = message;

        let before_ok = index == 0 || self.messages[index - 1].sent_at <= self.messages[index].sent_at;
        let after_ok = index + 1 >= self.messages.len()
            || self.messages[index].sent_at <= self.messages[index + 1].sent_at;
        if before_ok && after_ok {
            return index;
        }

        self.messages.sort_by_key(|m| m.sent_at);
        self.position_of(&id).unwrap_or(index)
    }

    /// Insert after every entry with `sent_at <= message.sent_at`
    fn insert_ordered(&mut self, message: ChatMessage) -> usize {
        let index = self
            .messages
            .partition_point(|m| m.sent_at <= message.sent_at);
        self.messages.insert(index, message);
        index
    }

    fn advance_status(&mut self, index: usize, incoming: &ChatMessage) {
        let existing = &mut self.messages[index];
        if incoming.status > existing.status {
            existing.status = incoming.status;
            existing.delivered_at = incoming.delivered_at.or(existing.delivered_at);
            existing.read_at = incoming.read_at.or(existing.read_at);
        }
    }
}
