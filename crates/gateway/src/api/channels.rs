//! Channel configuration endpoints and inbound webhooks.

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::Value;

use nextai_domain::agent::{AgentInputMessage, AgentProcessRequest};
use nextai_domain::channel::CHANNEL_QQ;
use nextai_domain::error::Error;

use crate::api::ApiResult;
use crate::state::AppState;

/// `GET /config/channels/{channel_id}`.
pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let config = state.store.read(|s| s.channels.get(&channel_id))?;
    Ok(Json(config))
}

/// `PUT /config/channels/{channel_id}` — routed through the validated
/// channel setter.
pub async fn put_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let config = state.store.write(move |s| {
        s.channels.set(&channel_id, body)?;
        s.channels.get(&channel_id)
    })?;
    Ok(Json(config))
}

/// Inbound QQ event. The concrete third-party wire format stays outside
/// the core; this is the minimal shape the bridge consumes.
#[derive(Debug, Deserialize)]
pub struct QqInboundEvent {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub message: String,
}

/// `POST /channels/qq/inbound` — validate, run the agent loop on the qq
/// channel, and let the loop dispatch the reply back out.
pub async fn qq_inbound(
    State(state): State<AppState>,
    Json(event): Json<QqInboundEvent>,
) -> ApiResult<Json<Value>> {
    let user_id = event.user_id.trim();
    let message = event.message.trim();
    if user_id.is_empty() {
        return Err(Error::InvalidQqEvent("qq event user_id is required".into()).into());
    }
    if message.is_empty() {
        return Err(Error::InvalidQqEvent("qq event message is required".into()).into());
    }
    let session_id = {
        let s = event.session_id.trim();
        if s.is_empty() {
            user_id
        } else {
            s
        }
    };

    let request = AgentProcessRequest {
        input: vec![AgentInputMessage::user(message)],
        session_id: session_id.to_owned(),
        user_id: user_id.to_owned(),
        channel: CHANNEL_QQ.to_owned(),
        ..Default::default()
    };

    let (reply, _events) = crate::runtime::run_buffered(state, request).await?;
    Ok(Json(serde_json::json!({ "reply": reply })))
}
