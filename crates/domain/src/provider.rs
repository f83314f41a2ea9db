//! Persisted provider entries and the active-model slot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Adapter id for the built-in echo provider.
pub const ADAPTER_DEMO: &str = "demo";
/// Adapter id for any OpenAI-compatible chat completions endpoint.
pub const ADAPTER_OPENAI_COMPATIBLE: &str = "openai-compatible";

/// Built-in provider ids.
pub const PROVIDER_DEMO: &str = "demo";
pub const PROVIDER_OPENAI: &str = "openai";

/// A configured LLM provider entry as persisted in the state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    #[serde(default)]
    pub adapter_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub model_aliases: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl ProviderEntry {
    pub fn builtin(id: &str, adapter_id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_owned(),
            adapter_id: adapter_id.to_owned(),
            api_key: String::new(),
            base_url: String::new(),
            display_name: display_name.to_owned(),
            enabled: true,
            headers: HashMap::new(),
            timeout_ms: 0,
            model_aliases: HashMap::new(),
        }
    }

    /// Effective adapter id, defaulted from the provider id when unset.
    pub fn effective_adapter_id(&self) -> Option<&str> {
        let explicit = self.adapter_id.trim();
        if !explicit.is_empty() {
            return Some(explicit);
        }
        default_adapter_for(&self.id)
    }
}

/// Default adapter for the built-in provider ids. Custom providers must
/// name their adapter explicitly.
pub fn default_adapter_for(provider_id: &str) -> Option<&'static str> {
    match provider_id {
        "" | PROVIDER_DEMO => Some(ADAPTER_DEMO),
        PROVIDER_OPENAI => Some(ADAPTER_OPENAI_COMPATIBLE),
        _ => None,
    }
}

/// Default model for a provider id (used by the migration pass and the
/// models catalog).
pub fn default_model_for(provider_id: &str) -> &'static str {
    match provider_id {
        PROVIDER_OPENAI => "gpt-4o-mini",
        _ => "demo-chat",
    }
}

/// Static model catalog served by `GET /models/catalog`.
pub fn model_catalog(provider_id: &str) -> &'static [&'static str] {
    match provider_id {
        PROVIDER_OPENAI => &["gpt-4o-mini", "gpt-4o", "gpt-4.1-mini", "o3-mini"],
        PROVIDER_DEMO => &["demo-chat"],
        _ => &[],
    }
}

/// The active `(provider, model)` slot. Empty provider_id means "demo".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveLlm {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model: String,
}
