use crate::domain::entities::Notification;
use std::collections::VecDeque;

/// Newest-first list of notifications, deduplicated by id
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    items: Vec<Notification>,
    last_processed: Option<String>,
    /// Ids pushed out by the capacity bound, so a redelivery stays a duplicate
    evicted: VecDeque<String>,
    capacity: usize,
}

impl NotificationFeed {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            last_processed: None,
            evicted: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    /// Apply a pushed notification. Returns true if it was new.
    pub fn push(&mut self, notification: Notification) -> bool {
        if self.last_processed.as_deref() == Some(notification.notification_id.as_str()) {
            return false;
        }
        self.last_processed = Some(notification.notification_id.clone());
        self.upsert(notification)
    }

    /// Merge a listed page. Returns how many were new.
    pub fn merge(&mut self, page: Vec<Notification>) -> usize {
        let mut added = 0;
        for notification in page {
            if self.upsert(notification) {
                added += 1;
            }
        }
        added
    }

    pub fn mark_read(&mut self, notification_id: &str) -> bool {
        match self
            .items
            .iter_mut()
            .find(|n| n.notification_id == notification_id)
        {
            Some(n) if !n.is_read => {
                n.is_read = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            changed += 1;
        }
        changed
    }

    fn upsert(&mut self, notification: Notification) -> bool {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|n| n.notification_id == notification.notification_id)
        {
            // Read state only moves forward
            existing.is_read |= notification.is_read;
            return false;
        }
        if self.evicted.contains(&notification.notification_id) {
            return false;
        }
        let index = self
            .items
            .partition_point(|n| n.sent_at >= notification.sent_at);
        self.items.insert(index, notification);
        while self.items.len() > self.capacity {
            if let Some(dropped) = self.items.pop() {
                self.remember_evicted(dropped.notification_id);
            }
        }
        index < self.capacity
    }

    fn remember_evicted(&mut self, notification_id: String) {
        if self.evicted.len() == self.capacity {
            self.evicted.pop_front();
        }
        self.evicted.push_back(notification_id);
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}
