use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use nextai_gateway::api;
use nextai_gateway::config::GatewayConfig;
use nextai_gateway::cron::CronScheduler;
use nextai_gateway::state::AppState;
use nextai_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ──────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nextai_gateway=debug")),
        )
        .init();

    tracing::info!("NextAI gateway starting");

    // ── Config + state store ─────────────────────────────────────────
    let config = GatewayConfig::from_env();
    let store = Store::open(&config.data_dir)
        .with_context(|| format!("opening state store at {}", config.data_dir.display()))?;
    tracing::info!(data_dir = %config.data_dir.display(), "state store ready");

    if config.api_key.trim().is_empty() {
        tracing::warn!("NEXTAI_API_KEY is not set — API runs unauthenticated");
    }
    if !config.disabled_tools.is_empty() {
        tracing::info!(disabled = ?config.disabled_tools, "tools disabled by operator");
    }

    let web_dir = config.web_dir.clone();
    let addr = config.bind_addr();
    let state = AppState::build(config, store);

    // ── Cron scheduler ───────────────────────────────────────────────
    CronScheduler::spawn(state.clone());

    // ── Router ───────────────────────────────────────────────────────
    let mut app = api::router(state.clone())
        .layer(CorsLayer::permissive())
        .with_state(state);

    if let Some(dir) = web_dir {
        tracing::info!(dir = %dir.display(), "serving web UI");
        app = app.fallback_service(tower_http::services::ServeDir::new(dir));
    }

    // ── Bind ─────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "NextAI gateway listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}
