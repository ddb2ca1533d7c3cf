use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current instant as an RFC 3339 string. Row timestamps are stored as text
/// so lexicographic order is chronological order.
pub fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("rfc3339")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,

    // unique: id
}

/// Partial profile update; only supplied fields are written.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.full_name.is_none() && self.avatar_url.is_none()
    }
}

/// One conversation per unordered participant pair. The id is derived from
/// the pair, never random; `user1_id` and `user2_id` hold the sorted pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub created_at: String,

    // unique: id
    // unique: user1_id, user2_id
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub room_id: String,
    pub created_at: String,
    pub is_read: bool,

    // unique: id
}

/// Insert payload; id and created_at are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
}

/// Ephemeral, channel-scoped, never persisted. One record per connection;
/// overwritten whole on every update, gone when the connection is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub typing: bool,
    pub online_at: String,
}

impl PresenceRecord {
    pub fn new(user_id: impl Into<String>, typing: bool) -> Self {
        Self {
            user_id: user_id.into(),
            typing,
            online_at: timestamp(),
        }
    }
}
