//! Shared application state passed to all API handlers and background tasks.

use std::sync::Arc;

use nextai_providers::Runner;
use nextai_store::Store;
use nextai_tools::ToolRegistry;

use crate::config::GatewayConfig;
use crate::cron::CronScheduler;
use crate::dispatch::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<Store>,
    pub runner: Arc<Runner>,
    pub tools: Arc<ToolRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub cron: Arc<CronScheduler>,
    /// SHA-256 digest of the configured API token; `None` disables auth.
    pub api_token_hash: Option<Arc<Vec<u8>>>,
}

impl AppState {
    /// Assemble the state graph. Subsystems receive the store as a handle at
    /// construction; nothing holds a reference back into `AppState`.
    pub fn build(config: GatewayConfig, store: Store) -> Self {
        use sha2::Digest;

        let api_token_hash = if config.api_key.trim().is_empty() {
            None
        } else {
            Some(Arc::new(
                sha2::Sha256::digest(config.api_key.trim().as_bytes()).to_vec(),
            ))
        };

        let store = Arc::new(store);
        let dispatcher = Arc::new(Dispatcher::new(store.clone()));

        Self {
            config: Arc::new(config.clone()),
            store,
            runner: Arc::new(Runner::new()),
            tools: Arc::new(ToolRegistry::new(config.disabled_tools)),
            dispatcher,
            cron: Arc::new(CronScheduler::new()),
            api_token_hash,
        }
    }
}
