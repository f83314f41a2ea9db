//! The persisted state shape and its default seeding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nextai_domain::channel::ChannelsConfig;
use nextai_domain::chat::{Chat, ChatMessage, DEFAULT_CHAT_ID};
use nextai_domain::cron::{CronJobSpec, CronJobState};
use nextai_domain::provider::{
    ActiveLlm, ProviderEntry, ADAPTER_DEMO, ADAPTER_OPENAI_COMPATIBLE, PROVIDER_DEMO,
    PROVIDER_OPENAI,
};

pub const SCHEMA_VERSION: u32 = 2;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything the gateway persists, as one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct State {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub chats: HashMap<String, Chat>,
    /// Message history per chat id, in append order.
    #[serde(default)]
    pub messages: HashMap<String, Vec<ChatMessage>>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    #[serde(default)]
    pub active_llm: ActiveLlm,
    #[serde(default)]
    pub cron_jobs: HashMap<String, CronJobSpec>,
    #[serde(default)]
    pub cron_states: HashMap<String, CronJobState>,
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Workspace view `config/envs.json`.
    #[serde(default)]
    pub envs: HashMap<String, String>,
    /// Workspace views `skills/<name>.json` (free-form documents).
    #[serde(default)]
    pub skills: HashMap<String, Value>,
}

impl State {
    /// Seed everything a fresh (or imported) state must always contain:
    /// the built-in provider entries and the undeletable default chat.
    pub fn ensure_defaults(&mut self) {
        self.schema_version = SCHEMA_VERSION;

        self.providers
            .entry(PROVIDER_DEMO.to_owned())
            .or_insert_with(|| ProviderEntry::builtin(PROVIDER_DEMO, ADAPTER_DEMO, "Demo"));
        self.providers
            .entry(PROVIDER_OPENAI.to_owned())
            .or_insert_with(|| {
                ProviderEntry::builtin(PROVIDER_OPENAI, ADAPTER_OPENAI_COMPATIBLE, "OpenAI")
            });

        if !self.chats.contains_key(DEFAULT_CHAT_ID) {
            let mut chat = Chat::new("Default", "default", "console", "default");
            chat.id = DEFAULT_CHAT_ID.to_owned();
            self.chats.insert(DEFAULT_CHAT_ID.to_owned(), chat);
        }
    }

    /// Find a chat by its logical key `(user_id, channel, session_id)`.
    pub fn find_chat(&self, user_id: &str, channel: &str, session_id: &str) -> Option<&Chat> {
        self.chats
            .values()
            .find(|c| c.matches_key(user_id, channel, session_id))
    }

    /// Find or create the chat for a logical key; returns its id.
    pub fn ensure_chat(&mut self, user_id: &str, channel: &str, session_id: &str) -> String {
        if let Some(chat) = self.find_chat(user_id, channel, session_id) {
            return chat.id.clone();
        }
        let chat = Chat::new("", user_id, channel, session_id);
        let id = chat.id.clone();
        self.chats.insert(id.clone(), chat);
        id
    }

    /// Append messages to a chat's history and touch its `updated_at`.
    pub fn append_messages(&mut self, chat_id: &str, messages: Vec<ChatMessage>) {
        self.messages
            .entry(chat_id.to_owned())
            .or_default()
            .extend(messages);
        if let Some(chat) = self.chats.get_mut(chat_id) {
            chat.updated_at = chrono::Utc::now();
        }
    }
}
