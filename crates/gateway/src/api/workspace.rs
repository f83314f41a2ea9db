//! Workspace file endpoints and state export/import.

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::Value;

use nextai_domain::error::Error;
use nextai_store::State as StoreState;

use crate::api::ApiResult;
use crate::state::AppState;
use crate::workspace;

/// `GET /workspace/files`.
pub async fn list_files(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let files = state.store.read(workspace::list_paths);
    Ok(Json(serde_json::json!({ "files": files })))
}

/// `GET /workspace/files/{path}`.
pub async fn get_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Json<Value>> {
    let content = state.store.read(|s| workspace::read_path(s, &path))?;
    Ok(Json(content))
}

/// `PUT /workspace/files/{path}`.
pub async fn put_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let content = state.store.write(move |s| {
        workspace::write_path(s, &path, body)?;
        workspace::read_path(s, &path)
    })?;
    Ok(Json(content))
}

/// `DELETE /workspace/files/{path}`.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .write(move |s| workspace::delete_path(s, &path))?;
    Ok(Json(serde_json::json!({"deleted": true})))
}

/// `GET /workspace/export` — the full state snapshot.
pub async fn export(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let snapshot = state.store.read(|s| serde_json::to_value(s))?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default = "default_mode")]
    pub mode: String,
    pub state: Value,
}

fn default_mode() -> String {
    "replace".into()
}

/// `POST /workspace/import` — replace the persisted state with the
/// imported snapshot (defaults are re-seeded, so built-in providers and
/// the default chat always survive an import).
pub async fn import(
    State(state): State<AppState>,
    Json(body): Json<ImportRequest>,
) -> ApiResult<Json<Value>> {
    if body.mode != "replace" {
        return Err(Error::InvalidRequest(format!(
            "unsupported import mode {:?}",
            body.mode
        ))
        .into());
    }

    let imported: StoreState = serde_json::from_value(body.state)
        .map_err(|e| Error::InvalidRequest(format!("invalid state snapshot: {e}")))?;

    state.store.write(move |s| {
        *s = imported;
        s.ensure_defaults();
        Ok(())
    })?;
    state.cron.poke();

    Ok(Json(serde_json::json!({"imported": true})))
}
