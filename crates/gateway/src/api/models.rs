//! Provider / model management endpoints.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::Value;

use nextai_domain::error::Error;
use nextai_domain::provider::{
    model_catalog, ActiveLlm, ProviderEntry, PROVIDER_DEMO, PROVIDER_OPENAI,
};

use crate::api::ApiResult;
use crate::state::AppState;

/// `GET /models` — all provider entries.
pub async fn list_models(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut providers: Vec<ProviderEntry> =
        state.store.read(|s| s.providers.values().cloned().collect());
    providers.sort_by(|a, b| a.id.cmp(&b.id));
    let active = state.store.read(|s| s.active_llm.clone());
    Ok(Json(serde_json::json!({
        "providers": providers,
        "active": active,
    })))
}

/// `GET /models/catalog` — known models per configured provider.
pub async fn catalog(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let ids: Vec<String> = state.store.read(|s| s.providers.keys().cloned().collect());
    let mut catalog = serde_json::Map::new();
    for id in ids {
        let models: Vec<&str> = model_catalog(&id).to_vec();
        catalog.insert(id, serde_json::json!(models));
    }
    Ok(Json(Value::Object(catalog)))
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfigRequest {
    #[serde(default)]
    pub adapter_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub model_aliases: Option<HashMap<String, String>>,
}

/// `PUT /models/{provider_id}/config` — update an entry, or create a
/// custom one (custom entries must name their adapter).
pub async fn configure_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Json(body): Json<ProviderConfigRequest>,
) -> ApiResult<Json<ProviderEntry>> {
    let provider_id = provider_id.trim().to_owned();
    if provider_id.is_empty() {
        return Err(Error::InvalidRequest("provider id is required".into()).into());
    }

    let entry = state.store.write(move |s| {
        let entry = match s.providers.get_mut(&provider_id) {
            Some(e) => e,
            None => {
                let adapter_id = body
                    .adapter_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidRequest(
                            "custom providers must specify adapter_id".into(),
                        )
                    })?;
                let entry = ProviderEntry::builtin(&provider_id, adapter_id, &provider_id);
                s.providers.entry(provider_id.clone()).or_insert(entry)
            }
        };

        if let Some(adapter_id) = &body.adapter_id {
            entry.adapter_id = adapter_id.trim().to_owned();
        }
        if let Some(api_key) = &body.api_key {
            entry.api_key = api_key.trim().to_owned();
        }
        if let Some(base_url) = &body.base_url {
            entry.base_url = base_url.trim().to_owned();
        }
        if let Some(display_name) = &body.display_name {
            entry.display_name = display_name.trim().to_owned();
        }
        if let Some(enabled) = body.enabled {
            entry.enabled = enabled;
        }
        if let Some(headers) = &body.headers {
            entry.headers = headers.clone();
        }
        if let Some(timeout_ms) = body.timeout_ms {
            entry.timeout_ms = timeout_ms;
        }
        if let Some(aliases) = &body.model_aliases {
            entry.model_aliases = aliases.clone();
        }

        // Disabling the active provider clears the slot.
        if !entry.enabled && s.active_llm.provider_id == provider_id {
            s.active_llm = ActiveLlm::default();
        }

        Ok(s.providers[&provider_id].clone())
    })?;

    Ok(Json(entry))
}

/// `DELETE /models/{provider_id}` — custom entries only; clears the active
/// slot when it referenced the deleted entry so it never dangles.
pub async fn delete_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if provider_id == PROVIDER_DEMO || provider_id == PROVIDER_OPENAI {
        return Err(
            Error::InvalidRequest(format!("builtin provider {provider_id:?} cannot be deleted"))
                .into(),
        );
    }

    state.store.write(|s| {
        if s.providers.remove(&provider_id).is_none() {
            return Err(Error::ProviderNotFound(provider_id.clone()));
        }
        if s.active_llm.provider_id == provider_id {
            s.active_llm = ActiveLlm::default();
        }
        Ok(())
    })?;
    Ok(Json(serde_json::json!({"deleted": true})))
}

/// `GET /models/active`.
pub async fn get_active(State(state): State<AppState>) -> ApiResult<Json<ActiveLlm>> {
    Ok(Json(state.store.read(|s| s.active_llm.clone())))
}

/// `PUT /models/active` — the slot must reference an existing, enabled
/// provider, or be empty.
pub async fn set_active(
    State(state): State<AppState>,
    Json(body): Json<ActiveLlm>,
) -> ApiResult<Json<ActiveLlm>> {
    let active = state.store.write(move |s| {
        let provider_id = body.provider_id.trim();
        if provider_id.is_empty() {
            s.active_llm = ActiveLlm::default();
            return Ok(s.active_llm.clone());
        }
        let entry = s
            .providers
            .get(provider_id)
            .ok_or_else(|| Error::ProviderNotFound(provider_id.to_owned()))?;
        if !entry.enabled {
            return Err(Error::ProviderDisabled(provider_id.to_owned()));
        }
        s.active_llm = ActiveLlm {
            provider_id: provider_id.to_owned(),
            model: body.model.trim().to_owned(),
        };
        Ok(s.active_llm.clone())
    })?;
    Ok(Json(active))
}
