//! Dispatch bridge — routes an outbound `(user_id, session_id, channel,
//! text)` tuple to the channel adapter registered for that channel.
//!
//! `console` delivers in-process (chat history only); `webhook` and `qq`
//! POST the tuple to their configured endpoints. Adapter failures surface
//! as `channel_dispatch_failed` to foreground callers; cron-originated
//! dispatches log and swallow them.

use std::collections::HashMap;
use std::sync::Arc;

use nextai_domain::channel::{WebhookChannelConfig, CHANNEL_CONSOLE, CHANNEL_QQ, CHANNEL_WEBHOOK};
use nextai_domain::chat::{ChatMessage, Role};
use nextai_domain::error::{Error, Result};
use nextai_store::Store;

/// One outbound delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OutboundMessage {
    pub user_id: String,
    pub session_id: String,
    #[serde(skip)]
    pub channel: String,
    pub text: String,
}

#[async_trait::async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn id(&self) -> &'static str;
    async fn deliver(&self, out: &OutboundMessage) -> Result<()>;
}

/// Adapter registry keyed by channel id.
pub struct Dispatcher {
    store: Arc<Store>,
    adapters: HashMap<&'static str, Arc<dyn ChannelAdapter>>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>) -> Self {
        let http = reqwest::Client::new();
        let mut adapters: HashMap<&'static str, Arc<dyn ChannelAdapter>> = HashMap::new();
        adapters.insert(
            CHANNEL_CONSOLE,
            Arc::new(ConsoleAdapter {
                store: store.clone(),
            }),
        );
        adapters.insert(
            CHANNEL_WEBHOOK,
            Arc::new(WebhookAdapter {
                store: store.clone(),
                http: http.clone(),
            }),
        );
        adapters.insert(
            CHANNEL_QQ,
            Arc::new(QqAdapter {
                store: store.clone(),
                http,
            }),
        );
        Self { store, adapters }
    }

    /// Whether `channel` is deliverable right now (adapter registered and
    /// channel configured).
    pub fn supports(&self, channel: &str) -> bool {
        self.adapters.contains_key(channel)
            && self.store.read(|s| s.channels.supports(channel))
    }

    /// Deliver one outbound message through the channel's adapter.
    pub async fn dispatch(&self, out: &OutboundMessage) -> Result<()> {
        let adapter = self
            .adapters
            .get(out.channel.as_str())
            .ok_or_else(|| Error::ChannelNotSupported(out.channel.clone()))?;
        if !self.store.read(|s| s.channels.supports(&out.channel)) {
            return Err(Error::ChannelNotSupported(out.channel.clone()));
        }
        adapter.deliver(out).await
    }

    /// Fire-and-forget variant used by cron and post-persist agent
    /// dispatch: failures are logged, never propagated.
    pub fn dispatch_background(self: Arc<Self>, out: OutboundMessage) {
        let dispatcher = self;
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&out).await {
                tracing::warn!(
                    channel = %out.channel,
                    user_id = %out.user_id,
                    error = %e,
                    "background dispatch failed"
                );
            }
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Console — in-process delivery into the chat history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ConsoleAdapter {
    store: Arc<Store>,
}

#[async_trait::async_trait]
impl ChannelAdapter for ConsoleAdapter {
    fn id(&self) -> &'static str {
        CHANNEL_CONSOLE
    }

    async fn deliver(&self, out: &OutboundMessage) -> Result<()> {
        let text = out.text.clone();
        let (user_id, session_id) = (out.user_id.clone(), out.session_id.clone());
        self.store.write(move |s| {
            let chat_id = s.ensure_chat(&user_id, CHANNEL_CONSOLE, &session_id);
            s.append_messages(&chat_id, vec![ChatMessage::new(Role::Assistant, text)]);
            Ok(())
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook — HTTP POST with configured headers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct WebhookAdapter {
    store: Arc<Store>,
    http: reqwest::Client,
}

#[async_trait::async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn id(&self) -> &'static str {
        CHANNEL_WEBHOOK
    }

    async fn deliver(&self, out: &OutboundMessage) -> Result<()> {
        let cfg: WebhookChannelConfig = self
            .store
            .read(|s| s.channels.webhook.clone())
            .ok_or_else(|| Error::ChannelNotSupported(CHANNEL_WEBHOOK.into()))?;

        post_json(&self.http, &cfg.url, &cfg.headers, cfg.timeout_ms, out).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QQ — HTTP POST with the configured access token
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct QqAdapter {
    store: Arc<Store>,
    http: reqwest::Client,
}

#[async_trait::async_trait]
impl ChannelAdapter for QqAdapter {
    fn id(&self) -> &'static str {
        CHANNEL_QQ
    }

    async fn deliver(&self, out: &OutboundMessage) -> Result<()> {
        let cfg = self
            .store
            .read(|s| s.channels.qq.clone())
            .ok_or_else(|| Error::ChannelNotSupported(CHANNEL_QQ.into()))?;

        let mut headers = HashMap::new();
        if !cfg.access_token.trim().is_empty() {
            headers.insert(
                "Authorization".to_owned(),
                format!("Bearer {}", cfg.access_token.trim()),
            );
        }
        post_json(&self.http, &cfg.endpoint, &headers, cfg.timeout_ms, out).await
    }
}

async fn post_json(
    http: &reqwest::Client,
    url: &str,
    headers: &HashMap<String, String>,
    timeout_ms: u64,
    out: &OutboundMessage,
) -> Result<()> {
    let mut req = http.post(url).json(out);
    for (k, v) in headers {
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() || v.is_empty() {
            continue;
        }
        req = req.header(k, v);
    }
    if timeout_ms > 0 {
        req = req.timeout(std::time::Duration::from_millis(timeout_ms));
    }

    let resp = req
        .send()
        .await
        .map_err(|e| Error::ChannelDispatchFailed(format!("delivery to {url} failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(Error::ChannelDispatchFailed(format!(
            "delivery to {url} returned status {}",
            resp.status().as_u16()
        )));
    }
    Ok(())
}
