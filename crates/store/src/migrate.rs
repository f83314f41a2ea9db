//! Load-time schema migration.
//!
//! Historical deployments created custom provider entries for self-hosted
//! OpenAI-compatible gateways. Those entries are merged into the canonical
//! `openai` entry on load, and the active-model slot is rewritten so it
//! never dangles.

use nextai_domain::provider::{
    default_model_for, model_catalog, ADAPTER_OPENAI_COMPATIBLE, PROVIDER_DEMO, PROVIDER_OPENAI,
};

use crate::state::State;

/// Run all migrations in place. Returns `true` when anything changed.
pub fn migrate(state: &mut State) -> bool {
    merge_legacy_openai_compatible(state)
}

/// Merge every OpenAI-compatible provider entry with a non-builtin id into
/// the canonical `openai` entry, preserving its connection settings, then
/// repair `active_llm` if it referenced a migrated entry.
fn merge_legacy_openai_compatible(state: &mut State) -> bool {
    let legacy_ids: Vec<String> = state
        .providers
        .values()
        .filter(|p| {
            p.id != PROVIDER_DEMO
                && p.id != PROVIDER_OPENAI
                && p.effective_adapter_id() == Some(ADAPTER_OPENAI_COMPATIBLE)
        })
        .map(|p| p.id.clone())
        .collect();

    if legacy_ids.is_empty() {
        return false;
    }

    for legacy_id in &legacy_ids {
        let legacy = match state.providers.remove(legacy_id) {
            Some(p) => p,
            None => continue,
        };

        let canonical = state
            .providers
            .entry(PROVIDER_OPENAI.to_owned())
            .or_insert_with(|| {
                nextai_domain::provider::ProviderEntry::builtin(
                    PROVIDER_OPENAI,
                    ADAPTER_OPENAI_COMPATIBLE,
                    "OpenAI",
                )
            });

        if !legacy.api_key.is_empty() {
            canonical.api_key = legacy.api_key;
        }
        if !legacy.base_url.is_empty() {
            canonical.base_url = legacy.base_url;
        }
        if !legacy.display_name.is_empty() {
            canonical.display_name = legacy.display_name;
        }
        if legacy.timeout_ms > 0 {
            canonical.timeout_ms = legacy.timeout_ms;
        }
        canonical.headers.extend(legacy.headers);
        canonical.model_aliases.extend(legacy.model_aliases);

        if state.active_llm.provider_id == *legacy_id {
            state.active_llm.provider_id = PROVIDER_OPENAI.to_owned();
        }

        tracing::info!(
            legacy_id = %legacy_id,
            "merged legacy openai-compatible provider into canonical entry"
        );
    }

    // The legacy model may not resolve under the migrated entry any more.
    if state.active_llm.provider_id == PROVIDER_OPENAI {
        let model = state.active_llm.model.trim();
        let resolves = model.is_empty()
            || model_catalog(PROVIDER_OPENAI).contains(&model)
            || state
                .providers
                .get(PROVIDER_OPENAI)
                .map(|p| p.model_aliases.contains_key(model))
                .unwrap_or(false);
        if !resolves {
            state.active_llm.model = default_model_for(PROVIDER_OPENAI).to_owned();
        }
    }

    true
}
