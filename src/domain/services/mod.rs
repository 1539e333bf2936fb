pub mod notification_feed;
pub mod reconciliation;

pub use notification_feed::NotificationFeed;
pub use reconciliation::{Conversation, ReconcileOutcome, DEFAULT_ECHO_TOLERANCE};
