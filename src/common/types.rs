use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message row as the backend stores it. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Message {
    /// Name shown next to the message. Rows written before the author had
    /// a profile name may carry none.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("someone")
    }
}

/// The signed-in user, mirrored read-only from the auth provider.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub access_token: String,
}

/// Ephemeral "so-and-so is typing" signal carried over the broadcast
/// channel. Never persisted anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingPing {
    pub user_id: String,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_message_row_parses_wire_timestamps() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "user_id": "u1",
            "content": "hello",
            "created_at": "2024-05-01T12:34:56+00:00",
        }))
        .unwrap();
        assert_eq!(
            message.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap()
        );
        // Profile columns are nullable; absent means no name yet.
        assert_eq!(message.username, None);
        assert_eq!(message.display_name(), "someone");
    }
}
