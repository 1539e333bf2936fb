pub mod admin_inbox;
pub mod chat_widget;
pub mod connection_manager;
pub mod message_dispatcher;
pub mod notification_bell;
pub mod session;

pub use admin_inbox::{AdminInbox, InboxEntry};
pub use chat_widget::{ChatWidget, WidgetView};
pub use connection_manager::{ConnectionManager, ConnectionState};
pub use message_dispatcher::MessageDispatcher;
pub use notification_bell::NotificationBell;
pub use session::{RealtimeSession, SessionPorts};
