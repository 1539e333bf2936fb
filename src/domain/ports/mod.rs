pub mod assignment_api;
pub mod message_api;
pub mod notification_api;
pub mod time_service;
pub mod transport;
pub mod user_notifier;

pub use assignment_api::AssignmentApi;
pub use message_api::MessageApi;
pub use notification_api::NotificationApi;
pub use time_service::TimeService;
pub use transport::{Transport, TransportLink};
pub use user_notifier::UserNotifier;
