//! The tool registry: spec declarations, the disabled-tool blacklist, and
//! invocation dispatch.

use std::collections::HashSet;

use serde_json::Value;

use nextai_domain::error::{Error, Result};
use nextai_domain::tool::{ToolOutcome, ToolSpec};

pub const TOOL_SHELL: &str = "shell";
pub const TOOL_VIEW: &str = "view";
pub const TOOL_EDIT: &str = "edit";

/// Environment variable naming globally disabled tools (comma-separated).
pub const DISABLED_TOOLS_ENV: &str = "NEXTAI_DISABLED_TOOLS";

/// Registry of the built-in tools, constructed with the disabled set so the
/// blacklist is injectable in tests.
pub struct ToolRegistry {
    disabled: HashSet<String>,
}

impl ToolRegistry {
    pub fn new(disabled: HashSet<String>) -> Self {
        Self { disabled }
    }

    /// Build from `NEXTAI_DISABLED_TOOLS`.
    pub fn from_env() -> Self {
        Self::new(parse_disabled_env(
            std::env::var(DISABLED_TOOLS_ENV).unwrap_or_default().as_str(),
        ))
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    /// Tool specs advertised to the model. Disabled tools are omitted
    /// entirely, so the model never sees them.
    pub fn specs(&self) -> Vec<ToolSpec> {
        [
            (TOOL_SHELL, shell_spec()),
            (TOOL_VIEW, view_spec()),
            (TOOL_EDIT, edit_spec()),
        ]
        .into_iter()
        .filter(|(name, _)| !self.is_disabled(name))
        .map(|(_, spec)| spec)
        .collect()
    }

    /// Execute one tool invocation against its canonical `{items: [...]}`
    /// arguments. Returns one combined outcome; input-shape problems fail
    /// with `invalid_tool_input` so the agent loop can feed them back.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Result<ToolOutcome> {
        if !matches!(name, TOOL_SHELL | TOOL_VIEW | TOOL_EDIT) {
            return Err(Error::ToolNotSupported(name.to_owned()));
        }
        if self.is_disabled(name) {
            return Err(Error::ToolDisabled(name.to_owned()));
        }

        let items = parse_items(arguments)?;

        let mut summaries = Vec::with_capacity(items.len());
        let mut outputs = Vec::new();
        let mut raws = Vec::with_capacity(items.len());
        let mut ok = true;

        for item in &items {
            let part = match name {
                TOOL_SHELL => crate::shell::run(item).await?,
                TOOL_VIEW => crate::view::run(item).await?,
                TOOL_EDIT => crate::edit::run(item).await?,
                _ => unreachable!(),
            };
            ok &= part.ok;
            summaries.push(part.summary);
            if !part.output.is_empty() {
                outputs.push(part.output);
            }
            raws.push(part.raw);
        }

        Ok(ToolOutcome {
            name: name.to_owned(),
            ok,
            summary: summaries.join("\n"),
            raw: Some(serde_json::json!({
                "output": outputs.join("\n"),
                "items": raws,
            })),
        })
    }
}

/// Result of executing one item of a tool invocation.
#[derive(Debug)]
pub(crate) struct ItemResult {
    pub ok: bool,
    /// Single-line user-presentable summary.
    pub summary: String,
    /// Full output fed back to the model (may be empty).
    pub output: String,
    /// Structured per-item payload for the UI.
    pub raw: Value,
}

/// Extract the canonical `{items: [...]}` array. Each item must be an
/// object; the legacy `{input: {...}}` shape is explicitly rejected.
pub fn parse_items(arguments: &Value) -> Result<Vec<Value>> {
    let obj = arguments
        .as_object()
        .ok_or_else(|| Error::InvalidToolInput("tool input must be a JSON object".into()))?;

    if obj.contains_key("input") {
        return Err(Error::InvalidToolInput(
            "legacy tool input shape {input: {...}} is not supported; use {items: [...]}".into(),
        ));
    }

    let items = obj
        .get("items")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::InvalidToolInput("tool input requires an items array".into()))?;

    if items.is_empty() {
        return Err(Error::InvalidToolInput("tool input items are empty".into()));
    }
    if let Some(bad) = items.iter().find(|i| !i.is_object()) {
        return Err(Error::InvalidToolInput(format!(
            "tool input item must be an object, got {bad}"
        )));
    }

    Ok(items.to_vec())
}

pub fn parse_disabled_env(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Spec declarations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn shell_spec() -> ToolSpec {
    ToolSpec {
        name: TOOL_SHELL.into(),
        description: "Run shell commands. Each item executes one command and returns its combined stdout/stderr.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "command": {"type": "string", "description": "Shell command to execute"},
                            "timeout_ms": {"type": "integer", "minimum": 1, "description": "Per-command timeout in milliseconds"}
                        },
                        "required": ["command"]
                    }
                }
            },
            "required": ["items"]
        }),
    }
}

fn view_spec() -> ToolSpec {
    ToolSpec {
        name: TOOL_VIEW.into(),
        description: "View a line range of a file. Returns numbered lines; out-of-range requests fall back to the whole file.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": {"type": "string", "description": "Absolute file path"},
                            "start": {"type": "integer", "minimum": 1, "description": "First line (1-based)"},
                            "end": {"type": "integer", "minimum": 1, "description": "Last line (inclusive)"}
                        },
                        "required": ["path", "start", "end"]
                    }
                }
            },
            "required": ["items"]
        }),
    }
}

fn edit_spec() -> ToolSpec {
    ToolSpec {
        name: TOOL_EDIT.into(),
        description: "Replace a line range of a file with new content.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": {"type": "string", "description": "Absolute file path"},
                            "start": {"type": "integer", "minimum": 1, "description": "First line to replace (1-based)"},
                            "end": {"type": "integer", "minimum": 1, "description": "Last line to replace (inclusive)"},
                            "content": {"type": "string", "description": "Replacement content; split on newlines"}
                        },
                        "required": ["path", "start", "end", "content"]
                    }
                }
            },
            "required": ["items"]
        }),
    }
}
