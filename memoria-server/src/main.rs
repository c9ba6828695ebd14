mod config;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use memoria::embedder::openai::OpenAiEmbedder;
use memoria::llm_client::openai::OpenAiClient;
use memoria::storage::{GraphStorage, PostgresStorage};
use memoria::types::MemoriaConfig;
use memoria::MemoryGraph;

use crate::config::Config;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    info!("memoria-server starting");

    let server = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid server configuration");
            return Err(e);
        }
    };
    let engine = match MemoriaConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid engine configuration");
            return Err(e.into());
        }
    };

    info!(
        addr = %server.bind_addr,
        model = %engine.model_name,
        embedding_model = %engine.embedding_model,
        "configuration resolved"
    );

    let state = build_state(&engine, server.run_migrations).await?;
    let storage = Arc::clone(&state.storage);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(server.bind_addr).await?;
    info!(addr = %server.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Detached enrichment tasks do not block shutdown.
    storage.close().await?;
    info!("server stopped");
    Ok(())
}

/// JSON log lines, filtered by `RUST_LOG` with both crates at `info` by default.
fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("memoria_server=info".parse()?)
        .add_directive("memoria=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();
    Ok(())
}

/// Connects storage and wires the LLM, embedder, and ingestion pipeline into
/// the state shared by every handler.
async fn build_state(engine: &MemoriaConfig, run_migrations: bool) -> anyhow::Result<AppState> {
    let storage = Arc::new(PostgresStorage::connect(&engine.database_url, run_migrations).await?);
    info!(migrations = run_migrations, "database connected");

    let llm = Arc::new(OpenAiClient::from_config(engine, engine.model_name.clone()));
    let embedder = Arc::new(OpenAiEmbedder::from_config(engine));
    let memory = Arc::new(MemoryGraph::new(
        llm,
        embedder,
        Arc::clone(&storage),
        Duration::from_secs(engine.request_timeout_secs),
    ));

    Ok(AppState { memory, storage })
}

/// Completes when the process is asked to stop: Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.expect("failed to install Ctrl-C handler");
            info!("received Ctrl-C, shutting down");
        }
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
