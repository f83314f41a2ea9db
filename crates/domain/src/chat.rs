//! Chats and their persisted message history.
//!
//! A chat is uniquely identified by `id`; its logical key is
//! `(user_id, channel, session_id)` and at most one chat exists per key.
//! The distinguished default chat (`chat-default`) always exists and can
//! never be deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ID of the distinguished default chat.
pub const DEFAULT_CHAT_ID: &str = "chat-default";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: Value,
}

impl Chat {
    /// Build a new chat for a logical key. Name defaults to the session id.
    pub fn new(name: &str, user_id: &str, channel: &str, session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: format!("chat-{}", uuid::Uuid::new_v4()),
            name: if name.is_empty() {
                session_id.to_owned()
            } else {
                name.to_owned()
            },
            session_id: session_id.to_owned(),
            user_id: user_id.to_owned(),
            channel: channel.to_owned(),
            created_at: now,
            updated_at: now,
            meta: Value::Object(Default::default()),
        }
    }

    /// Whether this chat answers to the given logical key.
    pub fn matches_key(&self, user_id: &str, channel: &str, session_id: &str) -> bool {
        self.user_id == user_id && self.channel == channel && self.session_id == session_id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One typed content part of a message. The wire shape is
/// `{"type": "text", "text": "..."}`; non-text parts are carried opaquely
/// and ignored by flattening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: text.into(),
        }
    }
}

/// A persisted message within a chat. Insertion order is append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: String,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

fn default_message_type() -> String {
    "message".into()
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            role,
            kind: default_message_type(),
            content: vec![ContentPart::text(text)],
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Flatten all text parts, trimmed and joined with newlines.
    pub fn flatten_text(&self) -> String {
        flatten_text(&self.content)
    }
}

/// Flatten content parts into a single newline-joined trimmed string,
/// skipping non-text parts and empty fragments.
pub fn flatten_text(content: &[ContentPart]) -> String {
    content
        .iter()
        .filter(|c| c.kind == "text")
        .map(|c| c.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_skips_non_text_and_blanks() {
        let content = vec![
            ContentPart::text("  hello "),
            ContentPart {
                kind: "image".into(),
                text: "ignored".into(),
            },
            ContentPart::text(""),
            ContentPart::text("world"),
        ];
        assert_eq!(flatten_text(&content), "hello\nworld");
    }

    #[test]
    fn chat_key_matching() {
        let chat = Chat::new("", "u1", "console", "s1");
        assert!(chat.matches_key("u1", "console", "s1"));
        assert!(!chat.matches_key("u1", "webhook", "s1"));
        assert_eq!(chat.name, "s1");
    }

    #[test]
    fn message_roundtrips_with_wire_shape() {
        let msg = ChatMessage::new(Role::User, "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["type"], "message");
        assert_eq!(json["content"][0]["type"], "text");
        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.flatten_text(), "hi");
    }
}
