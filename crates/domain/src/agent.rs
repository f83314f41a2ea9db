//! Agent process request/response shapes and the per-step event stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ContentPart;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One canonical input message. `role` is carried as a raw string and
/// normalized at translation time (unknown roles fall back to `user`);
/// `metadata` is an opaque map validated only where a field is consumed
/// (`tool_calls`, `tool_call_id`, `name`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInputMessage {
    #[serde(default)]
    pub role: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

impl AgentInputMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            kind: "message".into(),
            content: vec![ContentPart::text(text)],
            metadata: None,
        }
    }

    pub fn tool(text: impl Into<String>, tool_call_id: &str, name: &str) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert("tool_call_id".into(), Value::String(tool_call_id.into()));
        metadata.insert("name".into(), Value::String(name.into()));
        Self {
            role: "tool".into(),
            kind: "message".into(),
            content: vec![ContentPart::text(text)],
            metadata: Some(metadata),
        }
    }

    /// Normalized lowercase role; anything unrecognized becomes `user`.
    pub fn normalized_role(&self) -> &'static str {
        match self.role.trim().to_ascii_lowercase().as_str() {
            "system" => "system",
            "assistant" => "assistant",
            "tool" => "tool",
            _ => "user",
        }
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Opaque business parameters. `tool` selects an explicit tool call;
/// `max_steps` overrides the loop's step budget for this request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BizParams {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub items: Option<Value>,
    #[serde(default)]
    pub max_steps: Option<u32>,
}

/// Body of `POST /agent/process`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentProcessRequest {
    #[serde(default)]
    pub input: Vec<AgentInputMessage>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub biz_params: Option<BizParams>,
    /// Explicit tool item arrays. Must be JSON arrays when present.
    #[serde(default)]
    pub view: Option<Value>,
    #[serde(default)]
    pub edit: Option<Value>,
    #[serde(default)]
    pub shell: Option<Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted by the agent loop, in order:
/// `step_started` → (`tool_call` → `tool_result`)* → `assistant_delta`* →
/// `completed`. The `step` counter is monotonic from 1.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepStarted {
        step: u32,
    },
    ToolCall {
        step: u32,
        name: String,
        input: Value,
        /// JSON-serialized wire shape of the call, preserved verbatim for
        /// the persisted tool-call notices.
        raw: String,
    },
    ToolResult {
        step: u32,
        name: String,
        ok: bool,
        summary: String,
    },
    AssistantDelta {
        step: u32,
        text: String,
    },
    Completed {
        step: u32,
        reply: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_normalize_to_user() {
        let mut msg = AgentInputMessage::user("hi");
        msg.role = "Robot".into();
        assert_eq!(msg.normalized_role(), "user");
        msg.role = " Assistant ".into();
        assert_eq!(msg.normalized_role(), "assistant");
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let ev = AgentEvent::StepStarted { step: 1 };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "step_started");
        assert_eq!(json["step"], 1);

        let ev = AgentEvent::Completed {
            step: 2,
            reply: "done".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["reply"], "done");
    }

    #[test]
    fn tool_message_carries_call_metadata() {
        let msg = AgentInputMessage::tool("ok", "call_abc", "shell");
        assert_eq!(msg.metadata_str("tool_call_id"), Some("call_abc"));
        assert_eq!(msg.metadata_str("name"), Some("shell"));
        assert_eq!(msg.normalized_role(), "tool");
    }
}
