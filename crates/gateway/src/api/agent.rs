//! `POST /agent/process` — the chat entry point.
//!
//! `stream=false` buffers the event channel into `{reply, events}`;
//! `stream=true` frames each event as an SSE `data:` block flushed as it
//! is produced, terminated by the `[DONE]` sentinel.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};

use nextai_domain::agent::{AgentEvent, AgentProcessRequest};

use crate::api::{error_envelope, ApiError};
use crate::runtime::{self, LoopEvent};
use crate::state::AppState;

pub async fn process(
    State(state): State<AppState>,
    Json(request): Json<AgentProcessRequest>,
) -> Response {
    if request.stream {
        process_stream(state, request)
    } else {
        process_buffered(state, request).await
    }
}

async fn process_buffered(state: AppState, request: AgentProcessRequest) -> Response {
    match runtime::run_buffered(state, request).await {
        Ok((reply, events)) => Json(serde_json::json!({
            "reply": reply,
            "events": events,
        }))
        .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

fn process_stream(state: AppState, request: AgentProcessRequest) -> Response {
    // Pre-flight failures are plain HTTP errors; nothing has streamed yet.
    let mut rx = match runtime::process_agent(state, request) {
        Ok(rx) => rx,
        Err(e) => return ApiError(e).into_response(),
    };

    let stream = async_stream::stream! {
        while let Some(loop_event) = rx.recv().await {
            match loop_event {
                LoopEvent::Event(event) => {
                    let done = matches!(event, AgentEvent::Completed { .. });
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok::<_, std::convert::Infallible>(Event::default().data(data));
                    if done {
                        yield Ok(Event::default().data("[DONE]"));
                        break;
                    }
                }
                LoopEvent::Failed(e) => {
                    // Mid-stream failures terminate the stream; the envelope
                    // is the last data frame before the sentinel.
                    yield Ok(Event::default().data(error_envelope(&e).to_string()));
                    yield Ok(Event::default().data("[DONE]"));
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
