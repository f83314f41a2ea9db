//! OpenAI-compatible adapter.
//!
//! Works with OpenAI and any other endpoint that follows the chat
//! completions contract (self-hosted gateways, vLLM, LM Studio, ...).

use futures_util::StreamExt;
use serde_json::{Map, Value};

use nextai_domain::agent::AgentInputMessage;
use nextai_domain::chat::flatten_text;
use nextai_domain::error::{Error, Result};
use nextai_domain::provider::ADAPTER_OPENAI_COMPATIBLE;
use nextai_domain::tool::{ToolCall, ToolSpec};

use crate::demo::demo_reply;
use crate::runner::{GenerateConfig, ProviderAdapter, TurnResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Response bodies are read up to this many bytes before JSON parsing.
const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024;

pub struct OpenAiCompatAdapter;

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn id(&self) -> &'static str {
        ADAPTER_OPENAI_COMPATIBLE
    }

    async fn generate_turn(
        &self,
        input: &[AgentInputMessage],
        cfg: &GenerateConfig,
        tools: &[ToolSpec],
        http: &reqwest::Client,
    ) -> Result<TurnResult> {
        let api_key = cfg.api_key.trim();
        if api_key.is_empty() {
            return Err(Error::ProviderNotConfigured(
                "provider api_key is required".into(),
            ));
        }

        let base_url = {
            let trimmed = cfg.base_url.trim().trim_end_matches('/');
            if trimmed.is_empty() {
                DEFAULT_BASE_URL
            } else {
                trimmed
            }
        };

        let messages = to_wire_messages(input);
        if messages.is_empty() {
            // Nothing translatable to send upstream; answer like the demo
            // adapter instead of posting an empty conversation.
            return Ok(TurnResult {
                text: demo_reply(input),
                tool_calls: Vec::new(),
            });
        }

        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": messages,
        });
        let wire_tools = to_wire_tools(tools);
        if !wire_tools.is_empty() {
            body["tools"] = Value::Array(wire_tools);
        }

        let url = format!("{base_url}/chat/completions");
        let mut req = http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json");
        for (key, value) in &cfg.headers {
            let (k, v) = (key.trim(), value.trim());
            if k.is_empty() || v.is_empty() {
                continue;
            }
            req = req.header(k, v);
        }
        if cfg.timeout_ms > 0 {
            req = req.timeout(std::time::Duration::from_millis(cfg.timeout_ms));
        }

        tracing::debug!(url = %url, model = %cfg.model, "openai-compatible turn request");

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ProviderRequestFailed(format!("provider request failed: {e}")))?;

        let status = resp.status();
        let raw = read_limited(resp).await?;

        if !status.is_success() {
            return Err(Error::ProviderRequestFailed(format!(
                "provider returned status {}",
                status.as_u16()
            )));
        }

        parse_turn(&raw)
    }
}

/// Read the response body, capped at [`MAX_RESPONSE_BYTES`].
async fn read_limited(resp: reqwest::Response) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| Error::ProviderRequestFailed(format!("failed to read provider response: {e}")))?;
        let remaining = MAX_RESPONSE_BYTES - body.len();
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Canonical → wire translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Translate canonical input messages to OpenAI wire messages.
///
/// - `user` / `system`: emitted only when the flattened text is non-empty.
/// - `assistant`: emitted with content and/or `metadata.tool_calls`;
///   skipped when both are empty.
/// - `tool`: always emitted (content may be empty); `tool_call_id` and
///   `name` are copied from metadata.
pub fn to_wire_messages(input: &[AgentInputMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(input.len());
    for msg in input {
        let role = msg.normalized_role();
        let content = flatten_text(&msg.content);

        match role {
            "assistant" => {
                let tool_calls = tool_calls_from_metadata(msg);
                let mut item = Map::new();
                item.insert("role".into(), Value::String("assistant".into()));
                if !content.is_empty() {
                    item.insert("content".into(), Value::String(content));
                }
                let has_calls = !tool_calls.is_empty();
                if has_calls {
                    item.insert("tool_calls".into(), Value::Array(tool_calls));
                }
                if !item.contains_key("content") && !has_calls {
                    continue;
                }
                out.push(Value::Object(item));
            }
            "tool" => {
                let mut item = Map::new();
                item.insert("role".into(), Value::String("tool".into()));
                item.insert("content".into(), Value::String(content));
                if let Some(id) = msg.metadata_str("tool_call_id") {
                    item.insert("tool_call_id".into(), Value::String(id.to_owned()));
                }
                if let Some(name) = msg.metadata_str("name") {
                    item.insert("name".into(), Value::String(name.to_owned()));
                }
                out.push(Value::Object(item));
            }
            _ => {
                if content.is_empty() {
                    continue;
                }
                out.push(serde_json::json!({"role": role, "content": content}));
            }
        }
    }
    out
}

/// Sanitize an assistant message's persisted `tool_calls` metadata into
/// wire-shape entries. Entries missing a name or id are dropped; empty
/// arguments become `"{}"`; the `type` defaults to `function`.
fn tool_calls_from_metadata(msg: &AgentInputMessage) -> Vec<Value> {
    let raw = match msg.metadata.as_ref().and_then(|m| m.get("tool_calls")) {
        Some(Value::Array(arr)) => arr,
        _ => return Vec::new(),
    };

    raw.iter()
        .filter_map(|call| {
            let func = call.get("function")?;
            let name = func.get("name")?.as_str()?.trim();
            let id = call.get("id")?.as_str()?.trim();
            if name.is_empty() || id.is_empty() {
                return None;
            }
            let arguments = func
                .get("arguments")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("{}");
            Some(serde_json::json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": arguments},
            }))
        })
        .collect()
}

/// Translate tool specs to the OpenAI `tools` payload. Nameless specs are
/// dropped; parameters default to a permissive object schema.
pub fn to_wire_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .filter(|t| !t.name.trim().is_empty())
        .map(|t| {
            let mut params = t.parameters.clone();
            if !params.is_object() {
                params = serde_json::json!({"type": "object", "additionalProperties": true});
            } else if params.get("type").is_none() {
                params["type"] = Value::String("object".into());
            }
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name.trim(),
                    "description": t.description.trim(),
                    "parameters": params,
                }
            })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire → canonical parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse a chat-completions response body into a [`TurnResult`].
pub fn parse_turn(body: &[u8]) -> Result<TurnResult> {
    let v: Value = serde_json::from_slice(body)
        .map_err(|_| Error::ProviderInvalidReply("provider response is not valid json".into()))?;

    let message = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| Error::ProviderInvalidReply("provider response has no choices".into()))?;

    let text = extract_content(message.get("content")).trim().to_owned();
    let tool_calls = parse_tool_calls(message.get("tool_calls"))?;

    if text.is_empty() && tool_calls.is_empty() {
        return Err(Error::ProviderInvalidReply(
            "provider response has empty content".into(),
        ));
    }

    Ok(TurnResult { text, tool_calls })
}

/// `message.content` may be a plain string or an array of
/// `{type: "text", text}` objects; both shapes join with newlines.
fn extract_content(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn parse_tool_calls(raw: Option<&Value>) -> Result<Vec<ToolCall>> {
    let arr = match raw.and_then(|v| v.as_array()) {
        Some(a) if !a.is_empty() => a,
        _ => return Ok(Vec::new()),
    };

    let mut calls = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        let func = item.get("function").unwrap_or(&Value::Null);
        let name = func
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if name.is_empty() {
            return Err(Error::ProviderInvalidReply(format!(
                "provider tool call[{i}] name is empty"
            )));
        }

        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("call_{}", i + 1));

        let args_raw = func
            .get("arguments")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("{}");
        let arguments: Value = serde_json::from_str(args_raw).map_err(|e| {
            Error::ProviderInvalidReply(format!(
                "provider tool call {name:?} has invalid arguments: {e}"
            ))
        })?;
        if !arguments.is_object() {
            return Err(Error::ProviderInvalidReply(format!(
                "provider tool call {name:?} arguments are not an object"
            )));
        }

        calls.push(ToolCall {
            id,
            name: name.to_owned(),
            arguments,
        });
    }
    Ok(calls)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Translation ───────────────────────────────────────────────

    #[test]
    fn user_and_system_skip_empty_content() {
        let mut system = AgentInputMessage::user("be helpful");
        system.role = "system".into();
        let empty = AgentInputMessage::user("   ");
        let wire = to_wire_messages(&[system, empty, AgentInputMessage::user("hi")]);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["content"], "hi");
    }

    #[test]
    fn assistant_carries_tool_calls_and_skips_when_empty() {
        let mut assistant = AgentInputMessage::user("calling tool");
        assistant.role = "assistant".into();
        let mut meta = Map::new();
        meta.insert(
            "tool_calls".into(),
            serde_json::json!([{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "shell", "arguments": "{\"command\":\"pwd\"}"},
            }]),
        );
        assistant.metadata = Some(meta);

        let mut empty = AgentInputMessage::user("");
        empty.role = "assistant".into();

        let wire = to_wire_messages(&[assistant, empty]);
        assert_eq!(wire.len(), 1, "empty assistant message is skipped");
        assert_eq!(wire[0]["tool_calls"][0]["id"], "call_abc");
        assert_eq!(wire[0]["content"], "calling tool");
    }

    #[test]
    fn malformed_metadata_tool_calls_are_dropped() {
        let mut assistant = AgentInputMessage::user("x");
        assistant.role = "assistant".into();
        let mut meta = Map::new();
        meta.insert(
            "tool_calls".into(),
            serde_json::json!([
                {"id": "", "function": {"name": "shell"}},
                {"id": "ok", "function": {"name": "", "arguments": "{}"}},
                {"id": "keep", "function": {"name": "view", "arguments": ""}},
            ]),
        );
        assistant.metadata = Some(meta);

        let wire = to_wire_messages(&[assistant]);
        let calls = wire[0]["tool_calls"].as_array().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["id"], "keep");
        assert_eq!(calls[0]["function"]["arguments"], "{}");
    }

    #[test]
    fn tool_message_always_emits_with_call_metadata() {
        let tool = AgentInputMessage::tool("", "call_abc", "shell");
        let wire = to_wire_messages(&[tool]);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["content"], "");
        assert_eq!(wire[0]["tool_call_id"], "call_abc");
        assert_eq!(wire[0]["name"], "shell");
    }

    #[test]
    fn tools_payload_normalizes_parameters() {
        let tools = vec![
            ToolSpec {
                name: "shell".into(),
                description: "run".into(),
                parameters: serde_json::json!({"properties": {}}),
            },
            ToolSpec {
                name: "".into(),
                description: "dropped".into(),
                parameters: Value::Null,
            },
        ];
        let wire = to_wire_tools(&tools);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["type"], "function");
        assert_eq!(wire[0]["function"]["parameters"]["type"], "object");
    }

    // ── Parsing ───────────────────────────────────────────────────

    #[test]
    fn parses_plain_string_content() {
        let body = br#"{"choices":[{"message":{"content":"hello from provider"}}]}"#;
        let turn = parse_turn(body).unwrap();
        assert_eq!(turn.text, "hello from provider");
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn parses_array_content_joined_with_newlines() {
        let body = br#"{"choices":[{"message":{"content":[
            {"type":"text","text":"part one"},
            {"type":"image","text":"skipped"},
            {"type":"text","text":"part two"}
        ]}}]}"#;
        let turn = parse_turn(body).unwrap();
        assert_eq!(turn.text, "part one\npart two");
    }

    #[test]
    fn parses_tool_calls_and_synthesizes_missing_ids() {
        let body = br#"{"choices":[{"message":{"content":"","tool_calls":[
            {"type":"function","function":{"name":"view","arguments":""}},
            {"id":"call_x","type":"function","function":{"name":"shell","arguments":"{\"items\":[]}"}}
        ]}}]}"#;
        let turn = parse_turn(body).unwrap();
        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[0].id, "call_1");
        assert_eq!(turn.tool_calls[0].arguments, serde_json::json!({}));
        assert_eq!(turn.tool_calls[1].id, "call_x");
        assert_eq!(turn.tool_calls[1].name, "shell");
    }

    #[test]
    fn empty_tool_name_is_invalid() {
        let body = br#"{"choices":[{"message":{"content":"","tool_calls":[
            {"id":"c1","function":{"name":"","arguments":"{}"}}
        ]}}]}"#;
        let err = parse_turn(body).unwrap_err();
        assert_eq!(err.code(), "provider_invalid_reply");
    }

    #[test]
    fn non_object_arguments_are_invalid() {
        let body = br#"{"choices":[{"message":{"content":"","tool_calls":[
            {"id":"c1","function":{"name":"shell","arguments":"[1,2]"}}
        ]}}]}"#;
        let err = parse_turn(body).unwrap_err();
        assert_eq!(err.code(), "provider_invalid_reply");
    }

    #[test]
    fn missing_choices_and_garbage_are_invalid() {
        assert_eq!(
            parse_turn(br#"{"choices":[]}"#).unwrap_err().code(),
            "provider_invalid_reply"
        );
        assert_eq!(
            parse_turn(b"not json").unwrap_err().code(),
            "provider_invalid_reply"
        );
    }

    #[test]
    fn empty_content_without_tool_calls_is_invalid() {
        let body = br#"{"choices":[{"message":{"content":""}}]}"#;
        let err = parse_turn(body).unwrap_err();
        assert_eq!(err.code(), "provider_invalid_reply");
    }
}
