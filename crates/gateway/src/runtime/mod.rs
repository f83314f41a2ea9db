//! The agent loop — the bounded multi-step controller that alternates model
//! turns with tool executions.
//!
//! Entry point: [`process_agent`] validates the request, spawns the loop,
//! and returns a channel of [`LoopEvent`]s. The caller reads events as they
//! arrive for SSE streaming, or drains them via [`run_buffered`] for the
//! non-streaming `{reply, events}` shape.

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use nextai_domain::agent::{AgentEvent, AgentInputMessage, AgentProcessRequest};
use nextai_domain::channel::CHANNEL_CONSOLE;
use nextai_domain::chat::{ChatMessage, ContentPart, Role};
use nextai_domain::error::{Error, Result};
use nextai_domain::provider::{ADAPTER_DEMO, PROVIDER_DEMO};
use nextai_domain::tool::ToolCall;
use nextai_providers::GenerateConfig;
use nextai_store::State;

use crate::dispatch::OutboundMessage;
use crate::state::AppState;

/// Default step budget; overridable per request via `biz_params.max_steps`.
pub const DEFAULT_MAX_STEPS: u32 = 8;
const MAX_STEPS_CAP: u32 = 32;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loop events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What flows over the event channel: ordered agent events, or a single
/// terminal failure (provider/storage errors that surface to the caller).
#[derive(Debug)]
pub enum LoopEvent {
    Event(AgentEvent),
    Failed(Error),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pre-flight
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything resolved before the loop starts. Pre-flight failures become
/// plain HTTP errors; nothing has streamed yet.
pub struct Prepared {
    channel: String,
    explicit: Option<(String, Value)>,
    cfg: GenerateConfig,
    max_steps: u32,
}

/// Validate the request: channel must be configured, explicit tool fields
/// must be well-formed arrays, and the active provider must be resolvable.
pub fn preflight(state: &AppState, request: &AgentProcessRequest) -> Result<Prepared> {
    let channel = {
        let c = request.channel.trim();
        if c.is_empty() {
            CHANNEL_CONSOLE
        } else {
            c
        }
    };
    if !state.store.read(|s| s.channels.supports(channel)) {
        return Err(Error::ChannelNotSupported(channel.to_owned()));
    }

    let explicit = resolve_explicit(request)?;
    let cfg = state.store.read(resolve_generate_config)?;

    let max_steps = request
        .biz_params
        .as_ref()
        .and_then(|bp| bp.max_steps)
        .unwrap_or(DEFAULT_MAX_STEPS)
        .clamp(1, MAX_STEPS_CAP);

    Ok(Prepared {
        channel: channel.to_owned(),
        explicit,
        cfg,
        max_steps,
    })
}

/// Resolve the active `(provider, model)` slot into a [`GenerateConfig`],
/// checking the entry is present, enabled, and minimally configured.
pub fn resolve_generate_config(state: &State) -> Result<GenerateConfig> {
    let provider_id = {
        let id = state.active_llm.provider_id.trim();
        if id.is_empty() {
            PROVIDER_DEMO
        } else {
            id
        }
    };

    let entry = state.providers.get(provider_id).ok_or_else(|| {
        Error::ProviderNotConfigured(format!("active provider {provider_id:?} is not configured"))
    })?;
    if !entry.enabled {
        return Err(Error::ProviderDisabled(provider_id.to_owned()));
    }

    let adapter_id = entry.effective_adapter_id().ok_or_else(|| {
        Error::ProviderNotSupported(format!("provider {provider_id:?} is not supported"))
    })?;

    if adapter_id != ADAPTER_DEMO {
        if entry.api_key.trim().is_empty() {
            return Err(Error::ProviderNotConfigured(
                "provider api_key is required".into(),
            ));
        }
        if state.active_llm.model.trim().is_empty() {
            return Err(Error::ProviderNotConfigured(
                "model is required for active provider".into(),
            ));
        }
    }

    // Resolve model aliases at config time so adapters see the real name.
    let model = {
        let m = state.active_llm.model.trim();
        entry
            .model_aliases
            .get(m)
            .cloned()
            .unwrap_or_else(|| m.to_owned())
    };

    Ok(GenerateConfig {
        provider_id: provider_id.to_owned(),
        adapter_id: adapter_id.to_owned(),
        model,
        api_key: entry.api_key.clone(),
        base_url: entry.base_url.clone(),
        headers: entry.headers.clone(),
        timeout_ms: entry.timeout_ms,
    })
}

/// Resolve the explicit tool call, if any. `biz_params.tool` wins; otherwise
/// the first non-empty of the top-level `view` / `edit` / `shell` arrays.
/// The top-level fields MUST be arrays of item objects.
fn resolve_explicit(request: &AgentProcessRequest) -> Result<Option<(String, Value)>> {
    if let Some(bp) = &request.biz_params {
        if let Some(tool) = bp.tool.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let items = match &bp.items {
                Some(v) => explicit_items(tool, v)?,
                None => match top_level_field(request, tool) {
                    Some(v) => explicit_items(tool, v)?,
                    None => {
                        return Err(Error::InvalidToolInput(format!(
                            "explicit tool {tool:?} has no items"
                        )))
                    }
                },
            };
            return Ok(Some((
                tool.to_owned(),
                serde_json::json!({ "items": items }),
            )));
        }
    }

    for (name, field) in [
        ("view", &request.view),
        ("edit", &request.edit),
        ("shell", &request.shell),
    ] {
        if let Some(value) = field {
            let items = explicit_items(name, value)?;
            if !items.is_empty() {
                return Ok(Some((
                    name.to_owned(),
                    serde_json::json!({ "items": items }),
                )));
            }
        }
    }
    Ok(None)
}

fn top_level_field<'a>(request: &'a AgentProcessRequest, tool: &str) -> Option<&'a Value> {
    match tool {
        "view" => request.view.as_ref(),
        "edit" => request.edit.as_ref(),
        "shell" => request.shell.as_ref(),
        _ => None,
    }
}

/// Accept a bare array of items, or a `{items: [...]}` wrapper. A bare
/// object is rejected.
fn explicit_items(tool: &str, value: &Value) -> Result<Vec<Value>> {
    if let Some(arr) = value.as_array() {
        return Ok(arr.clone());
    }
    if let Some(arr) = value.get("items").and_then(|v| v.as_array()) {
        return Ok(arr.clone());
    }
    Err(Error::InvalidToolInput(format!(
        "{tool} input must be an array of item objects"
    )))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry points
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate the request and spawn the loop. Pre-flight failures return
/// `Err` before anything streams; everything after flows over the channel.
pub fn process_agent(
    state: AppState,
    request: AgentProcessRequest,
) -> Result<mpsc::Receiver<LoopEvent>> {
    let prepared = preflight(&state, &request)?;
    let (tx, rx) = mpsc::channel::<LoopEvent>(64);

    tokio::spawn(async move {
        if let Err(e) = run_loop(&state, &request, prepared, &tx).await {
            let _ = tx.send(LoopEvent::Failed(e)).await;
        }
    });

    Ok(rx)
}

/// Non-streaming shape: drain the event channel into `(reply, events)`.
pub async fn run_buffered(
    state: AppState,
    request: AgentProcessRequest,
) -> Result<(String, Vec<AgentEvent>)> {
    let mut rx = process_agent(state, request)?;
    let mut events = Vec::new();
    let mut reply = String::new();

    while let Some(loop_event) = rx.recv().await {
        match loop_event {
            LoopEvent::Event(event) => {
                if let AgentEvent::Completed { reply: r, .. } = &event {
                    reply = r.clone();
                }
                events.push(event);
            }
            LoopEvent::Failed(e) => return Err(e),
        }
    }
    Ok((reply, events))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks the interleave of tool batches and text within one turn. A single
/// counter assigns `tool_order` / `text_order` so clients can reconstruct
/// relative ordering from the persisted assistant metadata.
#[derive(Default)]
struct Interleave {
    counter: u32,
    tool_order: u32,
    text_order: u32,
}

impl Interleave {
    fn mark_tools(&mut self) {
        self.counter += 1;
        self.tool_order = self.counter;
    }
    fn mark_text(&mut self) {
        self.counter += 1;
        self.text_order = self.counter;
    }
}

async fn run_loop(
    state: &AppState,
    request: &AgentProcessRequest,
    prepared: Prepared,
    tx: &mpsc::Sender<LoopEvent>,
) -> Result<()> {
    let mut working: Vec<AgentInputMessage> = request.input.clone();
    let mut history: Vec<ChatMessage> = request
        .input
        .iter()
        .filter(|m| m.normalized_role() == "user")
        .map(|m| chat_message_from_parts(Role::User, &m.content))
        .collect();
    let mut notices: Vec<Value> = Vec::new();
    let mut interleave = Interleave::default();
    let mut step: u32 = 0;

    let reply = if let Some((tool, arguments)) = prepared.explicit.clone() {
        run_explicit(
            state,
            &prepared,
            &tool,
            &arguments,
            &mut working,
            &mut history,
            &mut notices,
            &mut interleave,
            &mut step,
            tx,
        )
        .await?
    } else {
        run_autonomous(
            state,
            &prepared,
            &mut working,
            &mut history,
            &mut notices,
            &mut interleave,
            &mut step,
            tx,
        )
        .await?
    };

    let reply = match reply {
        Some(r) => r,
        // Receiver dropped (client disconnect): abandon without persisting.
        None => return Ok(()),
    };

    // ── Persist the whole exchange in one write ────────────────────
    let mut metadata = Map::new();
    metadata.insert("tool_call_notices".into(), Value::Array(notices.clone()));
    if interleave.tool_order > 0 {
        metadata.insert("tool_order".into(), Value::from(interleave.tool_order));
    }
    metadata.insert("text_order".into(), Value::from(interleave.text_order));

    let mut final_msg = ChatMessage::new(Role::Assistant, reply.clone());
    final_msg.metadata = Some(metadata);
    history.push(final_msg);

    let (user_id, session_id, channel) = (
        request.user_id.clone(),
        request.session_id.clone(),
        prepared.channel.clone(),
    );
    state.store.write({
        let (user_id, channel, session_id) = (user_id.clone(), channel.clone(), session_id.clone());
        move |s| {
            let chat_id = s.ensure_chat(&user_id, &channel, &session_id);
            s.append_messages(&chat_id, history);
            Ok(())
        }
    })?;

    // ── Asynchronous dispatch for non-console channels ─────────────
    if channel != CHANNEL_CONSOLE {
        state.dispatcher.clone().dispatch_background(OutboundMessage {
            user_id,
            session_id,
            channel,
            text: reply,
        });
    }

    Ok(())
}

/// Explicit mode: exactly one tool call, then one model turn. Tool input
/// errors here are foreground errors (HTTP 400), not feedback.
#[allow(clippy::too_many_arguments)]
async fn run_explicit(
    state: &AppState,
    prepared: &Prepared,
    tool: &str,
    arguments: &Value,
    working: &mut Vec<AgentInputMessage>,
    history: &mut Vec<ChatMessage>,
    notices: &mut Vec<Value>,
    interleave: &mut Interleave,
    step: &mut u32,
    tx: &mpsc::Sender<LoopEvent>,
) -> Result<Option<String>> {
    *step += 1;
    if !emit(tx, AgentEvent::StepStarted { step: *step }).await {
        return Ok(None);
    }

    let call = ToolCall {
        id: "call_1".into(),
        name: tool.to_owned(),
        arguments: arguments.clone(),
    };

    if !emit_tool_call(tx, *step, &call, notices).await {
        return Ok(None);
    }

    let outcome = state.tools.invoke(&call.name, &call.arguments).await?;
    if !emit(
        tx,
        AgentEvent::ToolResult {
            step: *step,
            name: outcome.name.clone(),
            ok: outcome.ok,
            summary: outcome.summary.clone(),
        },
    )
    .await
    {
        return Ok(None);
    }

    interleave.mark_tools();
    push_tool_exchange(working, history, "", &[call.clone()]);
    push_tool_result(working, history, &call, &outcome.feedback_text());

    // One model turn over the augmented input; no tools advertised.
    let turn = state
        .runner
        .generate_turn(working, &prepared.cfg, &[])
        .await?;

    // The summaries keep the explicit invocation observable even when the
    // model (e.g. the demo echo) ignores the tool message.
    let mut reply = outcome.summary.clone();
    let text = turn.text.trim();
    if !text.is_empty() {
        reply.push('\n');
        reply.push_str(text);
    }

    if !emit(
        tx,
        AgentEvent::AssistantDelta {
            step: *step,
            text: reply.clone(),
        },
    )
    .await
    {
        return Ok(None);
    }
    interleave.mark_text();

    if !emit(
        tx,
        AgentEvent::Completed {
            step: *step,
            reply: reply.clone(),
        },
    )
    .await
    {
        return Ok(None);
    }
    Ok(Some(reply))
}

/// Model-autonomous mode: the model drives tool use, bounded by the step
/// budget. Structured tool input errors are fed back as `tool_error`
/// messages so the model can retry.
#[allow(clippy::too_many_arguments)]
async fn run_autonomous(
    state: &AppState,
    prepared: &Prepared,
    working: &mut Vec<AgentInputMessage>,
    history: &mut Vec<ChatMessage>,
    notices: &mut Vec<Value>,
    interleave: &mut Interleave,
    step: &mut u32,
    tx: &mpsc::Sender<LoopEvent>,
) -> Result<Option<String>> {
    let specs = state.tools.specs();
    let mut last_text = String::new();

    while *step < prepared.max_steps {
        *step += 1;
        if !emit(tx, AgentEvent::StepStarted { step: *step }).await {
            return Ok(None);
        }

        let turn = state
            .runner
            .generate_turn(working, &prepared.cfg, &specs)
            .await?;
        last_text = turn.text.trim().to_owned();

        if turn.tool_calls.is_empty() {
            if !last_text.is_empty()
                && !emit(
                    tx,
                    AgentEvent::AssistantDelta {
                        step: *step,
                        text: last_text.clone(),
                    },
                )
                .await
            {
                return Ok(None);
            }
            interleave.mark_text();
            if !emit(
                tx,
                AgentEvent::Completed {
                    step: *step,
                    reply: last_text.clone(),
                },
            )
            .await
            {
                return Ok(None);
            }
            return Ok(Some(last_text));
        }

        // ── Tool dispatch ──────────────────────────────────────────
        interleave.mark_tools();
        push_tool_exchange(working, history, &turn.text, &turn.tool_calls);

        for call in &turn.tool_calls {
            if !emit_tool_call(tx, *step, call, notices).await {
                return Ok(None);
            }

            let (ok, summary, feedback) =
                match state.tools.invoke(&call.name, &call.arguments).await {
                    Ok(outcome) => (outcome.ok, outcome.summary.clone(), outcome.feedback_text()),
                    Err(
                        e @ (Error::InvalidToolInput(_)
                        | Error::ToolDisabled(_)
                        | Error::ToolNotSupported(_)),
                    ) => {
                        // Recover locally: hand the structured error back to
                        // the model for another turn.
                        let code = e.code();
                        (
                            false,
                            format!("tool_error code={code}"),
                            format!("tool_error code={code}\n{e}"),
                        )
                    }
                    Err(e) => return Err(e),
                };

            if !emit(
                tx,
                AgentEvent::ToolResult {
                    step: *step,
                    name: call.name.clone(),
                    ok,
                    summary,
                },
            )
            .await
            {
                return Ok(None);
            }

            push_tool_result(working, history, call, &feedback);
        }
    }

    // Step budget exhausted: finish with the last turn's text.
    tracing::warn!(max_steps = prepared.max_steps, "agent step budget reached");
    interleave.mark_text();
    if !emit(
        tx,
        AgentEvent::Completed {
            step: *step,
            reply: last_text.clone(),
        },
    )
    .await
    {
        return Ok(None);
    }
    Ok(Some(last_text))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Send an event, reporting whether the receiver is still attached.
async fn emit(tx: &mpsc::Sender<LoopEvent>, event: AgentEvent) -> bool {
    tx.send(LoopEvent::Event(event)).await.is_ok()
}

/// Emit a `tool_call` event and record its payload as a notice for the
/// persisted assistant metadata.
async fn emit_tool_call(
    tx: &mpsc::Sender<LoopEvent>,
    step: u32,
    call: &ToolCall,
    notices: &mut Vec<Value>,
) -> bool {
    let event = AgentEvent::ToolCall {
        step,
        name: call.name.clone(),
        input: call.arguments.clone(),
        raw: call.wire_shape().to_string(),
    };
    if let Ok(payload) = serde_json::to_value(&event) {
        notices.push(payload);
    }
    emit(tx, event).await
}

/// Append the assistant(tool_calls) message to both the provider-facing
/// working input and the persisted history.
fn push_tool_exchange(
    working: &mut Vec<AgentInputMessage>,
    history: &mut Vec<ChatMessage>,
    text: &str,
    calls: &[ToolCall],
) {
    let mut metadata = Map::new();
    metadata.insert(
        "tool_calls".into(),
        Value::Array(calls.iter().map(ToolCall::wire_shape).collect()),
    );

    working.push(AgentInputMessage {
        role: "assistant".into(),
        kind: "message".into(),
        content: vec![ContentPart::text(text)],
        metadata: Some(metadata.clone()),
    });
    history.push(ChatMessage::new(Role::Assistant, text).with_metadata(metadata));
}

/// Append a tool-role result message to both sequences.
fn push_tool_result(
    working: &mut Vec<AgentInputMessage>,
    history: &mut Vec<ChatMessage>,
    call: &ToolCall,
    content: &str,
) {
    working.push(AgentInputMessage::tool(content, &call.id, &call.name));

    let mut metadata = Map::new();
    metadata.insert("tool_call_id".into(), Value::String(call.id.clone()));
    metadata.insert("name".into(), Value::String(call.name.clone()));
    history.push(ChatMessage::new(Role::Tool, content).with_metadata(metadata));
}

fn chat_message_from_parts(role: Role, parts: &[ContentPart]) -> ChatMessage {
    let mut msg = ChatMessage::new(role, "");
    msg.content = parts.to_vec();
    msg
}
