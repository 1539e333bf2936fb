use super::wire;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of portal notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    Appointment,
    Maintenance,
    Warranty,
    Payment,
    Message,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Appointment => "APPOINTMENT",
            NotificationType::Maintenance => "MAINTENANCE",
            NotificationType::Warranty => "WARRANTY",
            NotificationType::Payment => "PAYMENT",
            NotificationType::Message => "MESSAGE",
            NotificationType::System => "SYSTEM",
        }
    }
}

impl From<String> for NotificationType {
    fn from(s: String) -> Self {
        match s.to_uppercase().as_str() {
            "APPOINTMENT" => NotificationType::Appointment,
            "MAINTENANCE" => NotificationType::Maintenance,
            "WARRANTY" => NotificationType::Warranty,
            "PAYMENT" => NotificationType::Payment,
            "MESSAGE" | "CHAT" => NotificationType::Message,
            _ => NotificationType::System, // Default fallback
        }
    }
}

impl From<NotificationType> for String {
    fn from(t: NotificationType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification pushed to (or listed for) the current user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "id", deserialize_with = "wire::id_string")]
    pub notification_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_type")]
    pub notification_type: NotificationType,
    #[serde(default, alias = "read")]
    pub is_read: bool,
    #[serde(with = "wire::timestamp", alias = "createdAt")]
    pub sent_at: DateTime<Utc>,
}

fn default_type() -> NotificationType {
    NotificationType::System
}
