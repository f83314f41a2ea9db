//! The demo adapter — echoes the user input without any network I/O.
//!
//! Keeps the gateway fully usable (and testable) before any real provider
//! is configured.

use nextai_domain::agent::AgentInputMessage;
use nextai_domain::chat::flatten_text;
use nextai_domain::error::Result;
use nextai_domain::provider::ADAPTER_DEMO;
use nextai_domain::tool::ToolSpec;

use crate::runner::{GenerateConfig, ProviderAdapter, TurnResult};

pub struct DemoAdapter;

/// Echo reply over the user-role text parts of the input.
pub fn demo_reply(input: &[AgentInputMessage]) -> String {
    let parts: Vec<String> = input
        .iter()
        .filter(|m| m.normalized_role() == "user")
        .map(|m| flatten_text(&m.content))
        .filter(|t| !t.is_empty())
        .collect();

    if parts.is_empty() {
        "Echo: (empty input)".to_owned()
    } else {
        format!("Echo: {}", parts.join(" "))
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for DemoAdapter {
    fn id(&self) -> &'static str {
        ADAPTER_DEMO
    }

    async fn generate_turn(
        &self,
        input: &[AgentInputMessage],
        _cfg: &GenerateConfig,
        _tools: &[ToolSpec],
        _http: &reqwest::Client,
    ) -> Result<TurnResult> {
        Ok(TurnResult {
            text: demo_reply(input),
            tool_calls: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_user_parts_with_spaces() {
        let input = vec![
            AgentInputMessage::user("hello"),
            AgentInputMessage::user("world"),
        ];
        assert_eq!(demo_reply(&input), "Echo: hello world");
    }

    #[test]
    fn ignores_non_user_roles() {
        let mut assistant = AgentInputMessage::user("not me");
        assistant.role = "assistant".into();
        let input = vec![assistant, AgentInputMessage::user("me")];
        assert_eq!(demo_reply(&input), "Echo: me");
    }

    #[test]
    fn empty_input_has_a_marker() {
        assert_eq!(demo_reply(&[]), "Echo: (empty input)");
        let input = vec![AgentInputMessage::user("   ")];
        assert_eq!(demo_reply(&input), "Echo: (empty input)");
    }
}
