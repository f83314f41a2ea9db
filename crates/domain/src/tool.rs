//! Tool calls, tool specs, and tool invocation outcomes (provider-agnostic).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model. Every provider adapter converts
/// its wire format to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Always a JSON object after adapter validation.
    pub arguments: Value,
}

impl ToolCall {
    /// The OpenAI-style wire shape of this call, used both for provider
    /// request serialization and for the persisted tool-call notices.
    pub fn wire_shape(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.arguments.to_string(),
            }
        })
    }
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the canonical `{items: [...]}` input shape.
    pub parameters: Value,
}

/// Result of executing one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub name: String,
    pub ok: bool,
    /// Short, single-line, user-presentable summary.
    pub summary: String,
    /// Structured output for the UI; full output lives here, not in summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ToolOutcome {
    /// The text fed back to the model as the tool-role message: the summary,
    /// followed by the raw `output` field when the tool produced one.
    pub fn feedback_text(&self) -> String {
        let output = self
            .raw
            .as_ref()
            .and_then(|r| r.get("output"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if output.is_empty() {
            self.summary.clone()
        } else {
            format!("{}\n{}", self.summary, output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_serializes_arguments_as_string() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "shell".into(),
            arguments: serde_json::json!({"items": [{"command": "pwd"}]}),
        };
        let wire = call.wire_shape();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "shell");
        let args: Value =
            serde_json::from_str(wire["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["items"][0]["command"], "pwd");
    }

    #[test]
    fn feedback_text_appends_output() {
        let outcome = ToolOutcome {
            name: "shell".into(),
            ok: true,
            summary: "shell <pwd> -> /tmp".into(),
            raw: Some(serde_json::json!({"output": "/tmp\n"})),
        };
        assert_eq!(outcome.feedback_text(), "shell <pwd> -> /tmp\n/tmp\n");
    }
}
