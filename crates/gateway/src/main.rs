use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use envoy_domain::config::Config;
use envoy_gateway::api;
use envoy_gateway::bus::EventBus;
use envoy_gateway::runtime::integrations;
use envoy_gateway::runtime::scheduler::Scheduler;
use envoy_gateway::state::AppState;
use envoy_providers::OpenAiCompatProvider;
use envoy_sandbox::Executor;
use envoy_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ──────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,envoy_gateway=debug")),
        )
        .init();

    tracing::info!("Envoy starting");

    // ── Config (env file first, so persisted credentials apply) ─────
    integrations::load_env_file(std::path::Path::new(
        &std::env::var("ENV_FILE").unwrap_or_else(|_| ".env".into()),
    ));
    let config = Arc::new(Config::from_env());

    // ── Tools workspace root ─────────────────────────────────────────
    std::fs::create_dir_all(&config.tools_fs_root)
        .with_context(|| format!("creating tools root {}", config.tools_fs_root.display()))?;

    // ── Store ────────────────────────────────────────────────────────
    let store = Arc::new(Store::open(&config.database_path).context("opening store")?);

    // ── LLM provider ─────────────────────────────────────────────────
    if config.llm.api_key.is_empty() {
        tracing::warn!("LLM_API_KEY is empty — model calls will fail until it is set");
    }
    let llm = Arc::new(OpenAiCompatProvider::new(&config.llm).context("building LLM provider")?);
    tracing::info!(base_url = %config.llm.base_url, model = %config.llm.model, "LLM provider ready");

    // ── Scheduler ────────────────────────────────────────────────────
    let scheduler = Arc::new(
        Scheduler::new()
            .await
            .map_err(anyhow::Error::msg)
            .context("starting scheduler")?,
    );

    // ── App state ────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        store,
        llm,
        bus: Arc::new(EventBus::new()),
        sandbox: Arc::new(Executor::new()),
        scheduler: scheduler.clone(),
    };

    // Install cron jobs for every enabled task.
    scheduler.schedule_all(state.clone()).await;

    // ── Router ───────────────────────────────────────────────────────
    let app = api::router()
        .layer(CorsLayer::permissive())
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "Envoy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal(scheduler: Arc<Scheduler>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    scheduler.shutdown().await;
}
