use super::wire;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Identity of a chat message.
///
/// A message is either confirmed by the server or still a local placeholder; never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Persisted(String),
    Temporary(String),
}

impl MessageId {
    pub const TEMP_PREFIX: &'static str = "temp-";

    /// Classify a raw wire identity
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with(Self::TEMP_PREFIX) {
            MessageId::Temporary(raw)
        } else {
            MessageId::Persisted(raw)
        }
    }

    /// Build a placeholder identity from a unix-millis timestamp and a per-millisecond sequence
    pub fn temporary(millis: i64, seq: u32) -> Self {
        if seq == 0 {
            MessageId::Temporary(format!("{}{}", Self::TEMP_PREFIX, millis))
        } else {
            MessageId::Temporary(format!("{}{}-{}", Self::TEMP_PREFIX, millis, seq))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Persisted(id) | MessageId::Temporary(id) => id,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, MessageId::Temporary(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        wire::id_string(deserializer).map(MessageId::parse)
    }
}

/// Delivery state reported by the server; ordered by progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "SENT",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Read => "READ",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message between two participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "id")]
    pub message_id: MessageId,
    #[serde(deserialize_with = "wire::id_string")]
    pub sender_id: String,
    #[serde(deserialize_with = "wire::id_string")]
    pub receiver_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(with = "wire::timestamp")]
    pub sent_at: DateTime<Utc>,
    #[serde(
        default,
        with = "wire::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "wire::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_at: Option<DateTime<Utc>>,
    /// Correlation token generated for an optimistic send, echoed back by servers that support it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

impl ChatMessage {
    pub const MAX_CONTENT_LEN: usize = 5_000;

    pub fn is_temporary(&self) -> bool {
        self.message_id.is_temporary()
    }

    /// Whether this message belongs to the unordered pair {a, b}
    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    /// The other participant from `user_id`'s point of view
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.sender_id == user_id {
            Some(&self.receiver_id)
        } else if self.receiver_id == user_id {
            Some(&self.sender_id)
        } else {
            None
        }
    }

    /// Same logical payload: text and attachment both equal
    pub fn same_payload(&self, other: &ChatMessage) -> bool {
        self.content == other.content && self.image_url == other.image_url
    }

    /// Validate what a user is about to send
    pub fn validate_content(content: &str, image_url: Option<&str>) -> Result<(), String> {
        if content.trim().is_empty() && image_url.map_or(true, |url| url.trim().is_empty()) {
            return Err("Message must have text or an attachment".to_string());
        }
        let len = content.chars().count();
        if len > Self::MAX_CONTENT_LEN {
            return Err(format!(
                "Message content too long: {} characters (max {})",
                len,
                Self::MAX_CONTENT_LEN
            ));
        }
        Ok(())
    }
}

/// Payload of the "send message" command, shared by the transport and the REST fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

impl SendMessageRequest {
    /// Request mirroring an optimistic message
    pub fn from_optimistic(message: &ChatMessage) -> Self {
        Self {
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            content: message.content.clone(),
            image_url: message.image_url.clone(),
            client_message_id: message.client_message_id.clone(),
        }
    }
}

/// Payload of the read-receipt command: `user_id` has read everything from `other_user_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub user_id: String,
    pub other_user_id: String,
}

/// Unread-count push; the backend sends either a bare number or a small object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UnreadCountPayload {
    Bare(u64),
    Wrapped {
        #[serde(rename = "unreadCount", alias = "count")]
        unread_count: u64,
    },
}

impl UnreadCountPayload {
    pub fn count(&self) -> u64 {
        match self {
            UnreadCountPayload::Bare(n) => *n,
            UnreadCountPayload::Wrapped { unread_count } => *unread_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_classification() {
        assert!(MessageId::parse("temp-1000").is_temporary());
        assert!(!MessageId::parse("abc").is_temporary());
        assert_eq!(MessageId::temporary(1000, 0).as_str(), "temp-1000");
        assert_eq!(MessageId::temporary(1000, 2).as_str(), "temp-1000-2");
    }

    #[test]
    fn test_deserialize_server_message_with_numeric_ids() {
        let json = r#"{
            "messageId": 42,
            "senderId": 7,
            "receiverId": "9",
            "content": "Your car is ready",
            "status": "DELIVERED",
            "sentAt": "2026-03-01T10:00:00",
            "deliveredAt": null
        }"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.message_id, MessageId::Persisted("42".to_string()));
        assert_eq!(msg.sender_id, "7");
        assert_eq!(msg.receiver_id, "9");
        assert_eq!(msg.status, MessageStatus::Delivered);
        assert!(msg.delivered_at.is_none());
        assert!(msg.image_url.is_none());
    }

    #[test]
    fn test_status_defaults_to_sent() {
        let json = r#"{"id":"m1","senderId":"a","receiverId":"b","sentAt":1767261600000}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(msg.content, "");
    }

    #[test]
    fn test_involves_is_unordered() {
        let json = r#"{"messageId":"m1","senderId":"a","receiverId":"b","sentAt":0}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert!(msg.involves("a", "b"));
        assert!(msg.involves("b", "a"));
        assert!(!msg.involves("a", "c"));
        assert_eq!(msg.counterpart_of("b"), Some("a"));
        assert_eq!(msg.counterpart_of("z"), None);
    }

    #[test]
    fn test_validate_content() {
        assert!(ChatMessage::validate_content("hi", None).is_ok());
        assert!(ChatMessage::validate_content("  ", None).is_err());
        assert!(ChatMessage::validate_content("", Some("https://cdn/x.png")).is_ok());
        let long = "a".repeat(ChatMessage::MAX_CONTENT_LEN + 1);
        assert!(ChatMessage::validate_content(&long, None)
            .unwrap_err()
            .contains("too long"));
    }

    #[test]
    fn test_unread_count_payload_forms() {
        let bare: UnreadCountPayload = serde_json::from_str("3").unwrap();
        let wrapped: UnreadCountPayload = serde_json::from_str(r#"{"unreadCount":5}"#).unwrap();
        assert_eq!(bare.count(), 3);
        assert_eq!(wrapped.count(), 5);
    }

    #[test]
    fn test_send_request_serializes_camel_case() {
        let req = SendMessageRequest {
            sender_id: "a".to_string(),
            receiver_id: "b".to_string(),
            content: "hi".to_string(),
            image_url: None,
            client_message_id: Some("c-1".to_string()),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["senderId"], "a");
        assert_eq!(value["clientMessageId"], "c-1");
        assert!(value.get("imageUrl").is_none());
    }
}
