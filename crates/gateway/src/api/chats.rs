//! Chat CRUD endpoints.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::Value;

use nextai_domain::chat::{Chat, DEFAULT_CHAT_ID};
use nextai_domain::error::Error;

use crate::api::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListChatsQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

/// `GET /chats?user_id&channel` — newest first.
pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ListChatsQuery>,
) -> ApiResult<Json<Value>> {
    let mut chats: Vec<Chat> = state.store.read(|s| {
        s.chats
            .values()
            .filter(|c| {
                query.user_id.as_deref().map_or(true, |u| c.user_id == u)
                    && query.channel.as_deref().map_or(true, |ch| c.channel == ch)
            })
            .cloned()
            .collect()
    });
    chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(Json(serde_json::json!({ "chats": chats })))
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub name: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    #[serde(default)]
    pub meta: Value,
}

/// `POST /chats` — creating with an existing `(user_id, channel,
/// session_id)` returns the existing chat.
pub async fn create_chat(
    State(state): State<AppState>,
    Json(body): Json<CreateChatRequest>,
) -> ApiResult<Json<Chat>> {
    if body.session_id.trim().is_empty() || body.user_id.trim().is_empty() {
        return Err(Error::InvalidRequest("session_id and user_id are required".into()).into());
    }
    if !state.store.read(|s| s.channels.supports(body.channel.trim())) {
        return Err(Error::ChannelNotSupported(body.channel.trim().to_owned()).into());
    }

    let chat = state.store.write(move |s| {
        if let Some(existing) = s
            .find_chat(body.user_id.trim(), body.channel.trim(), body.session_id.trim())
            .cloned()
        {
            return Ok(existing);
        }
        let mut chat = Chat::new(
            body.name.trim(),
            body.user_id.trim(),
            body.channel.trim(),
            body.session_id.trim(),
        );
        if body.meta.is_object() {
            chat.meta = body.meta;
        }
        s.chats.insert(chat.id.clone(), chat.clone());
        Ok(chat)
    })?;

    Ok(Json(chat))
}

/// `GET /chats/{id}` — the chat plus its ordered message history.
pub async fn get_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let (chat, messages) = state
        .store
        .read(|s| {
            s.chats
                .get(&id)
                .cloned()
                .map(|c| (c, s.messages.get(&id).cloned().unwrap_or_default()))
        })
        .ok_or(Error::ChatNotFound(id))?;

    Ok(Json(serde_json::json!({
        "chat": chat,
        "messages": messages,
    })))
}

/// `DELETE /chats/{id}` — the default chat is protected.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if id == DEFAULT_CHAT_ID {
        return Err(Error::DefaultChatProtected.into());
    }
    state.store.write(|s| {
        if s.chats.remove(&id).is_none() {
            return Err(Error::ChatNotFound(id.clone()));
        }
        s.messages.remove(&id);
        Ok(())
    })?;
    Ok(Json(serde_json::json!({"deleted": true})))
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// `POST /chats/batch-delete` — deletes what it can; the default chat is
/// silently skipped.
pub async fn batch_delete_chats(
    State(state): State<AppState>,
    Json(body): Json<BatchDeleteRequest>,
) -> ApiResult<Json<Value>> {
    let deleted = state.store.write(|s| {
        let mut deleted = 0;
        for id in &body.ids {
            if id == DEFAULT_CHAT_ID {
                continue;
            }
            if s.chats.remove(id).is_some() {
                s.messages.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    })?;
    Ok(Json(serde_json::json!({"deleted": deleted})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::app_state;

    fn create_body(session_id: &str) -> CreateChatRequest {
        CreateChatRequest {
            name: "A".into(),
            session_id: session_id.into(),
            user_id: "u1".into(),
            channel: "console".into(),
            meta: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn creating_the_same_logical_key_returns_the_existing_chat() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);

        let first = create_chat(State(state.clone()), Json(create_body("s1")))
            .await
            .unwrap()
            .0;
        let second = create_chat(State(state.clone()), Json(create_body("s1")))
            .await
            .unwrap()
            .0;
        assert_eq!(first.id, second.id, "chat id is stable per logical key");

        let other = create_chat(State(state), Json(create_body("s2")))
            .await
            .unwrap()
            .0;
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn default_chat_cannot_be_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);

        let err = delete_chat(State(state.clone()), Path(DEFAULT_CHAT_ID.into()))
            .await
            .unwrap_err();
        assert_eq!(err.0.code(), "default_chat_protected");

        state
            .store
            .read(|s| assert!(s.chats.contains_key(DEFAULT_CHAT_ID)));
    }

    #[tokio::test]
    async fn batch_delete_skips_the_default_chat() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let chat = create_chat(State(state.clone()), Json(create_body("s1")))
            .await
            .unwrap()
            .0;

        let out = batch_delete_chats(
            State(state.clone()),
            Json(BatchDeleteRequest {
                ids: vec![DEFAULT_CHAT_ID.into(), chat.id.clone(), "missing".into()],
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(out["deleted"], 1);
        state.store.read(|s| {
            assert!(s.chats.contains_key(DEFAULT_CHAT_ID));
            assert!(!s.chats.contains_key(&chat.id));
        });
    }

    #[tokio::test]
    async fn missing_chat_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let err = get_chat(State(state), Path("nope".into())).await.unwrap_err();
        assert_eq!(err.0.code(), "chat_not_found");
    }

    #[tokio::test]
    async fn unknown_channel_is_rejected_at_create() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        let mut body = create_body("s1");
        body.channel = "telegram".into();
        let err = create_chat(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.0.code(), "channel_not_supported");
    }
}
