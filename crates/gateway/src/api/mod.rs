//! HTTP surface of the gateway.
//!
//! Routes are split into **public** (`/healthz`, `/version` — no auth) and
//! **protected** (everything else, gated behind the shared-token
//! middleware). Errors use the envelope `{"error": {code, message}}`.

pub mod agent;
pub mod auth;
pub mod channels;
pub mod chats;
pub mod cron;
pub mod models;
pub mod workspace;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;

use nextai_domain::error::Error;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wraps the domain error so handlers can use `?` and still produce the
/// wire envelope.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(error_envelope(&self.0))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn error_envelope(e: &Error) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": e.code(),
            "message": e.to_string(),
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Health and build metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the full API router. `state` is needed to wire the auth
/// middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(version));

    let protected = Router::new()
        // Chats
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/chats/batch-delete", post(chats::batch_delete_chats))
        .route("/chats/:id", get(chats::get_chat).delete(chats::delete_chat))
        // Agent loop
        .route("/agent/process", post(agent::process))
        // Cron jobs
        .route("/cron/jobs", get(cron::list_jobs).post(cron::create_job))
        .route(
            "/cron/jobs/:id",
            put(cron::update_job).delete(cron::delete_job),
        )
        .route("/cron/jobs/:id/pause", post(cron::pause_job))
        .route("/cron/jobs/:id/resume", post(cron::resume_job))
        .route("/cron/jobs/:id/run", post(cron::run_job_now))
        .route("/cron/jobs/:id/state", get(cron::get_job_state))
        // Models / providers
        .route("/models", get(models::list_models))
        .route("/models/catalog", get(models::catalog))
        .route(
            "/models/active",
            get(models::get_active).put(models::set_active),
        )
        .route(
            "/models/:provider_id/config",
            put(models::configure_provider),
        )
        .route("/models/:provider_id", delete(models::delete_provider))
        // Channels
        .route(
            "/config/channels/:channel_id",
            get(channels::get_channel).put(channels::put_channel),
        )
        .route("/channels/qq/inbound", post(channels::qq_inbound))
        // Workspace files
        .route("/workspace/files", get(workspace::list_files))
        .route(
            "/workspace/files/*path",
            get(workspace::get_file)
                .put(workspace::put_file)
                .delete(workspace::delete_file),
        )
        .route("/workspace/export", get(workspace::export))
        .route("/workspace/import", post(workspace::import))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}
