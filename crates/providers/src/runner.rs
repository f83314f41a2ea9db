//! The runner: adapter registry plus the `generate_turn` / `generate_reply`
//! entry points.

use std::collections::HashMap;
use std::sync::Arc;

use nextai_domain::agent::AgentInputMessage;
use nextai_domain::error::{Error, Result};
use nextai_domain::provider::{default_adapter_for, ADAPTER_DEMO};
use nextai_domain::tool::{ToolCall, ToolSpec};

use crate::demo::DemoAdapter;
use crate::openai_compat::OpenAiCompatAdapter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / result types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for one turn, resolved from the active provider
/// entry by the caller.
#[derive(Debug, Clone, Default)]
pub struct GenerateConfig {
    pub provider_id: String,
    /// Adapter override; defaulted from `provider_id` when empty.
    pub adapter_id: String,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub headers: HashMap<String, String>,
    pub timeout_ms: u64,
}

/// One model turn: the text (possibly empty) and any tool calls.
#[derive(Debug, Clone, Default)]
pub struct TurnResult {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Trait every provider adapter implements. Adapters translate between the
/// canonical message shape and their provider's HTTP wire format.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &'static str;

    async fn generate_turn(
        &self,
        input: &[AgentInputMessage],
        cfg: &GenerateConfig,
        tools: &[ToolSpec],
        http: &reqwest::Client,
    ) -> Result<TurnResult>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registry of provider adapters keyed by adapter id.
pub struct Runner {
    http: reqwest::Client,
    adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        let mut runner = Self {
            http,
            adapters: HashMap::new(),
        };
        runner.register_adapter(Arc::new(DemoAdapter));
        runner.register_adapter(Arc::new(OpenAiCompatAdapter));
        runner
    }

    /// Register (or replace) an adapter under its own id.
    pub fn register_adapter(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let id = adapter.id().trim();
        if id.is_empty() {
            return;
        }
        self.adapters.insert(adapter.id(), adapter);
    }

    /// Run one model turn against the configured provider.
    pub async fn generate_turn(
        &self,
        input: &[AgentInputMessage],
        cfg: &GenerateConfig,
        tools: &[ToolSpec],
    ) -> Result<TurnResult> {
        let provider_id = cfg.provider_id.trim().to_ascii_lowercase();

        let adapter_id = if cfg.adapter_id.trim().is_empty() {
            default_adapter_for(&provider_id).ok_or_else(|| {
                Error::ProviderNotSupported(format!("provider {provider_id:?} is not supported"))
            })?
        } else {
            cfg.adapter_id.trim()
        };

        if adapter_id != ADAPTER_DEMO && cfg.model.trim().is_empty() {
            return Err(Error::ProviderNotConfigured(
                "model is required for active provider".into(),
            ));
        }

        let adapter = self.adapters.get(adapter_id).ok_or_else(|| {
            Error::ProviderNotSupported(format!("adapter {adapter_id:?} is not supported"))
        })?;

        tracing::debug!(
            provider = %provider_id,
            adapter = adapter_id,
            model = %cfg.model,
            tools = tools.len(),
            "generate turn"
        );

        adapter.generate_turn(input, cfg, tools, &self.http).await
    }

    /// Thin wrapper for callers that cannot handle tool calls (cron text
    /// post-processing, channel replies). Rejects tool-call responses.
    pub async fn generate_reply(
        &self,
        input: &[AgentInputMessage],
        cfg: &GenerateConfig,
    ) -> Result<String> {
        let turn = self.generate_turn(input, cfg, &[]).await?;
        if !turn.tool_calls.is_empty() {
            return Err(Error::ProviderInvalidReply(
                "provider response contains tool calls but tool support is disabled".into(),
            ));
        }
        let text = turn.text.trim().to_owned();
        if text.is_empty() {
            return Err(Error::ProviderInvalidReply(
                "provider response has empty content".into(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_input(text: &str) -> Vec<AgentInputMessage> {
        vec![AgentInputMessage::user(text)]
    }

    #[tokio::test]
    async fn demo_reply_echoes_user_text() {
        let runner = Runner::new();
        let cfg = GenerateConfig {
            provider_id: "demo".into(),
            model: "demo-chat".into(),
            ..Default::default()
        };
        let reply = runner
            .generate_reply(&user_input("hello world"), &cfg)
            .await
            .unwrap();
        assert_eq!(reply, "Echo: hello world");
    }

    #[tokio::test]
    async fn empty_provider_id_defaults_to_demo() {
        let runner = Runner::new();
        let reply = runner
            .generate_reply(&user_input("hi"), &GenerateConfig::default())
            .await
            .unwrap();
        assert_eq!(reply, "Echo: hi");
    }

    #[tokio::test]
    async fn unknown_provider_is_not_supported() {
        let runner = Runner::new();
        let cfg = GenerateConfig {
            provider_id: "unknown-provider".into(),
            model: "m".into(),
            ..Default::default()
        };
        let err = runner.generate_reply(&user_input("hi"), &cfg).await.unwrap_err();
        assert_eq!(err.code(), "provider_not_supported");
    }

    #[tokio::test]
    async fn openai_without_model_is_not_configured() {
        let runner = Runner::new();
        let cfg = GenerateConfig {
            provider_id: "openai".into(),
            api_key: "sk-test".into(),
            ..Default::default()
        };
        let err = runner.generate_reply(&user_input("hi"), &cfg).await.unwrap_err();
        assert_eq!(err.code(), "provider_not_configured");
    }

    #[tokio::test]
    async fn openai_without_api_key_is_not_configured() {
        let runner = Runner::new();
        let cfg = GenerateConfig {
            provider_id: "openai".into(),
            model: "gpt-4o-mini".into(),
            ..Default::default()
        };
        let err = runner.generate_reply(&user_input("hi"), &cfg).await.unwrap_err();
        assert_eq!(err.code(), "provider_not_configured");
    }

    #[tokio::test]
    async fn custom_provider_uses_explicit_adapter() {
        // A custom provider with the demo adapter routes through it.
        let runner = Runner::new();
        let cfg = GenerateConfig {
            provider_id: "custom-provider".into(),
            adapter_id: "demo".into(),
            model: "custom-model".into(),
            ..Default::default()
        };
        let reply = runner.generate_reply(&user_input("hi"), &cfg).await.unwrap();
        assert_eq!(reply, "Echo: hi");
    }

    #[tokio::test]
    async fn scripted_adapter_can_be_registered() {
        struct Scripted;
        #[async_trait::async_trait]
        impl ProviderAdapter for Scripted {
            fn id(&self) -> &'static str {
                "scripted"
            }
            async fn generate_turn(
                &self,
                _input: &[AgentInputMessage],
                _cfg: &GenerateConfig,
                _tools: &[ToolSpec],
                _http: &reqwest::Client,
            ) -> Result<TurnResult> {
                Ok(TurnResult {
                    text: "scripted reply".into(),
                    tool_calls: Vec::new(),
                })
            }
        }

        let mut runner = Runner::new();
        runner.register_adapter(Arc::new(Scripted));
        let cfg = GenerateConfig {
            provider_id: "anything".into(),
            adapter_id: "scripted".into(),
            model: "m".into(),
            ..Default::default()
        };
        let reply = runner.generate_reply(&user_input("hi"), &cfg).await.unwrap();
        assert_eq!(reply, "scripted reply");
    }
}
