//! Per-channel delivery configuration.
//!
//! `console` is always available and delivers in-process (chat history
//! only); other channels deliver over HTTP to an external endpoint.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const CHANNEL_CONSOLE: &str = "console";
pub const CHANNEL_WEBHOOK: &str = "webhook";
pub const CHANNEL_QQ: &str = "qq";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleChannelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ConsoleChannelConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QqChannelConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub timeout_ms: u64,
}

/// The full channel configuration block of the state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub console: ConsoleChannelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookChannelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qq: Option<QqChannelConfig>,
}

impl ChannelsConfig {
    /// All channel ids that exist in the configuration model.
    pub fn known_ids() -> &'static [&'static str] {
        &[CHANNEL_CONSOLE, CHANNEL_WEBHOOK, CHANNEL_QQ]
    }

    /// Whether the given channel is configured and usable as a request or
    /// dispatch target. Console is always available.
    pub fn supports(&self, channel: &str) -> bool {
        match channel {
            CHANNEL_CONSOLE => self.console.enabled,
            CHANNEL_WEBHOOK => self.webhook.is_some(),
            CHANNEL_QQ => self.qq.is_some(),
            _ => false,
        }
    }

    /// Read one channel's config as JSON (workspace-file view).
    pub fn get(&self, channel: &str) -> Result<Value> {
        match channel {
            CHANNEL_CONSOLE => Ok(serde_json::to_value(&self.console)?),
            CHANNEL_WEBHOOK => Ok(serde_json::to_value(self.webhook.clone().unwrap_or_default())?),
            CHANNEL_QQ => Ok(serde_json::to_value(self.qq.clone().unwrap_or_default())?),
            other => Err(Error::ChannelNotSupported(other.to_owned())),
        }
    }

    /// Replace one channel's config from JSON through its validated setter.
    pub fn set(&mut self, channel: &str, body: Value) -> Result<()> {
        match channel {
            CHANNEL_CONSOLE => {
                self.console = serde_json::from_value(body)
                    .map_err(|e| Error::InvalidRequest(format!("invalid console config: {e}")))?;
            }
            CHANNEL_WEBHOOK => {
                let cfg: WebhookChannelConfig = serde_json::from_value(body)
                    .map_err(|e| Error::InvalidRequest(format!("invalid webhook config: {e}")))?;
                if cfg.url.trim().is_empty() {
                    return Err(Error::InvalidRequest("webhook url is required".into()));
                }
                self.webhook = Some(cfg);
            }
            CHANNEL_QQ => {
                let cfg: QqChannelConfig = serde_json::from_value(body)
                    .map_err(|e| Error::InvalidRequest(format!("invalid qq config: {e}")))?;
                if cfg.endpoint.trim().is_empty() {
                    return Err(Error::InvalidRequest("qq endpoint is required".into()));
                }
                self.qq = Some(cfg);
            }
            other => return Err(Error::ChannelNotSupported(other.to_owned())),
        }
        Ok(())
    }

    /// Reset one channel's config (DELETE on the workspace-file view).
    pub fn reset(&mut self, channel: &str) -> Result<()> {
        match channel {
            CHANNEL_CONSOLE => self.console = ConsoleChannelConfig::default(),
            CHANNEL_WEBHOOK => self.webhook = None,
            CHANNEL_QQ => self.qq = None,
            other => return Err(Error::ChannelNotSupported(other.to_owned())),
        }
        Ok(())
    }
}
