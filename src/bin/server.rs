use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use datachat::api::{router, AppState};
use datachat::config::AppConfig;
use datachat::context::ContextProvider;
use datachat::llm::{create_llm_client, LlmGateway};
use datachat::orchestrator::Orchestrator;
use datachat::session::SessionStore;
use datachat::store::{DataStore, SqlxStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("datachat=info,tower_http=info")),
        )
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    info!(backend = %config.llm_backend, "connecting to store");
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;
    let store: Arc<dyn DataStore> = Arc::new(SqlxStore::new(pool));

    let client = create_llm_client(
        config.llm_backend,
        config.llm_api_key.clone(),
        config.llm_model.clone(),
    );
    let gateway = Arc::new(LlmGateway::new(client));

    let sessions = SessionStore::new(config.session_ttl);
    sessions.spawn_sweeper();

    let provider = ContextProvider::from_path(
        config.schema_path.clone(),
        config.annotations_path.clone(),
    );

    let orchestrator = Arc::new(Orchestrator::new(store, gateway, sessions, provider));
    let app = router(AppState { orchestrator });

    info!(addr = %config.bind_addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
