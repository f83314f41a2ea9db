//! Environment-driven gateway configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use nextai_tools::registry::{parse_disabled_env, DISABLED_TOOLS_ENV};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8088;
const DEFAULT_DATA_DIR: &str = ".data";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Shared static API token; empty disables auth (dev mode).
    pub api_key: String,
    /// Optional static web UI directory.
    pub web_dir: Option<PathBuf>,
    pub disabled_tools: HashSet<String>,
}

impl GatewayConfig {
    /// Read the `NEXTAI_*` environment.
    pub fn from_env() -> Self {
        let host = env_or("NEXTAI_HOST", DEFAULT_HOST);
        let port = std::env::var("NEXTAI_PORT")
            .ok()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let data_dir = PathBuf::from(env_or("NEXTAI_DATA_DIR", DEFAULT_DATA_DIR));
        let api_key = std::env::var("NEXTAI_API_KEY").unwrap_or_default();
        let web_dir = std::env::var("NEXTAI_WEB_DIR")
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let disabled_tools =
            parse_disabled_env(&std::env::var(DISABLED_TOOLS_ENV).unwrap_or_default());

        Self {
            host,
            port,
            data_dir,
            api_key,
            web_dir,
            disabled_tools,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_owned(),
        _ => default.to_owned(),
    }
}
