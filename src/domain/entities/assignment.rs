use super::wire;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Support assignment binding a customer to a staff member.
///
/// Owned by the assignment service; the messaging core only reads it to find a counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(alias = "id", deserialize_with = "wire::id_string")]
    pub assignment_id: String,
    #[serde(deserialize_with = "wire::id_string")]
    pub customer_id: String,
    #[serde(deserialize_with = "wire::id_string")]
    pub staff_id: String,
    #[serde(
        default,
        with = "wire::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Assignment {
    /// The other side of the assignment, if `user_id` is part of it
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.customer_id == user_id {
            Some(&self.staff_id)
        } else if self.staff_id == user_id {
            Some(&self.customer_id)
        } else {
            None
        }
    }
}
