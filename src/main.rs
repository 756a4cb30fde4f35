use doc_chat::api::{create_router, AppState};
use doc_chat::infrastructure::config::ServerConfig;
use doc_chat::infrastructure::AppConfig;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "api=debug,doc_chat=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::load()?;
    info!(
        model = config.credentials.model_name(),
        api_key = config.credentials.api_key().is_some(),
        project = config.credentials.project_id().is_some(),
        "Configuration loaded"
    );

    let server = config.config.server.clone();
    let sessions = config.config.sessions.clone();
    let state = AppState::from_config(config)?;
    if let Some(ttl) = sessions.idle_ttl() {
        state.sessions.spawn_sweeper(ttl, sessions.sweep_interval());
    }
    let app = create_router(state);

    let listener = bind(&server).await?;
    info!("API server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("Shutting down");
}

/// Accepts host names as well as IP literals.
async fn bind(server: &ServerConfig) -> std::io::Result<TcpListener> {
    TcpListener::bind((server.host.as_str(), server.port)).await
}
